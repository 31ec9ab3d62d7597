use kube::CustomResourceExt;
use kulta_sidecarset::crd::sidecarset::SidecarSet;

fn main() -> anyhow::Result<()> {
    // Use: cargo run --bin gen-crd | python3 -c "import sys,json,yaml; print(yaml.dump(json.load(sys.stdin), default_flow_style=False))"
    // to convert to YAML
    println!("{}", serde_json::to_string_pretty(&SidecarSet::crd())?);
    Ok(())
}
