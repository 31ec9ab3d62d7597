use super::instance::Instance;
use crate::crd::sidecarset::ScatterTerm;

/// Expand wildcard scatter terms into concrete ones
///
/// Concrete terms are copied as-is. A `{key, "*"}` term is replaced, in its
/// own slot, by one `{key, value}` term per distinct value of `key` in
/// `instances`, in first-seen order. Pods without the label are skipped and
/// terms already emitted are never repeated.
///
/// # Examples
/// ```ignore
/// // [{zone, a}, {zone, *}] over pods with zone=b, zone=a, zone=c
/// // -> [{zone, a}, {zone, b}, {zone, c}]
/// ```
pub fn resolve_scatter_terms(terms: &[ScatterTerm], instances: &[Instance]) -> Vec<ScatterTerm> {
    let mut resolved: Vec<ScatterTerm> = Vec::with_capacity(terms.len());

    for term in terms {
        if !term.is_wildcard() {
            if !resolved.contains(term) {
                resolved.push(term.clone());
            }
            continue;
        }

        for value in instances.iter().filter_map(|i| i.labels.get(&term.key)) {
            let concrete = ScatterTerm::new(&term.key, value);
            if !resolved.contains(&concrete) {
                resolved.push(concrete);
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(key: &str, value: &str) -> ScatterTerm {
        ScatterTerm::new(key, value)
    }

    fn labelled(name: &str, pairs: &[(&str, &str)]) -> Instance {
        Instance {
            labels: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Instance::new(name)
        }
    }

    #[test]
    fn test_wildcard_expands_in_first_seen_order() {
        let terms = vec![
            term("key1", "value1"),
            term("key2", "value2"),
            term("key3", "value3"),
            term("key4", "*"),
        ];
        let values = [
            "value4-1", "value4-2", "value4-3", "value4-4", "value4-4", "value4-4",
        ];
        let instances: Vec<Instance> = values
            .iter()
            .enumerate()
            .map(|(i, v)| labelled(&format!("pod-{i}"), &[("key4", v)]))
            .collect();

        let resolved = resolve_scatter_terms(&terms, &instances);

        assert_eq!(
            resolved,
            vec![
                term("key1", "value1"),
                term("key2", "value2"),
                term("key3", "value3"),
                term("key4", "value4-1"),
                term("key4", "value4-2"),
                term("key4", "value4-3"),
                term("key4", "value4-4"),
            ]
        );
    }

    #[test]
    fn test_wildcard_occupies_its_slot() {
        let terms = vec![term("zone", "*"), term("app", "web")];
        let instances = vec![
            labelled("a", &[("zone", "z2")]),
            labelled("b", &[("app", "web")]),
            labelled("c", &[("zone", "z1")]),
        ];

        assert_eq!(
            resolve_scatter_terms(&terms, &instances),
            vec![term("zone", "z2"), term("zone", "z1"), term("app", "web")]
        );
    }

    #[test]
    fn test_wildcard_skips_values_already_emitted() {
        let terms = vec![term("zone", "z1"), term("zone", "*")];
        let instances = vec![
            labelled("a", &[("zone", "z1")]),
            labelled("b", &[("zone", "z2")]),
        ];

        assert_eq!(
            resolve_scatter_terms(&terms, &instances),
            vec![term("zone", "z1"), term("zone", "z2")]
        );
    }

    #[test]
    fn test_wildcard_without_matching_labels_resolves_to_nothing() {
        let terms = vec![term("zone", "*")];
        let instances = vec![labelled("a", &[("app", "web")])];
        assert!(resolve_scatter_terms(&terms, &instances).is_empty());
        assert!(resolve_scatter_terms(&[], &instances).is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent_and_deterministic() {
        let terms = vec![term("app", "web"), term("zone", "*")];
        let instances = vec![
            labelled("a", &[("zone", "z3")]),
            labelled("b", &[("zone", "z1")]),
            labelled("c", &[("zone", "z3")]),
        ];

        let once = resolve_scatter_terms(&terms, &instances);
        let twice = resolve_scatter_terms(&once, &instances);

        assert_eq!(once, twice);
        assert_eq!(once, resolve_scatter_terms(&terms, &instances));
    }
}
