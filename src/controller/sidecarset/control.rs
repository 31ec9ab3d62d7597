use super::eligibility::UpgradeControl;
use super::hash::{HashError, TemplateHash};
use super::instance::Instance;
use crate::crd::sidecarset::SidecarSet;
use kube::ResourceExt;

/// Revision predicates for one SidecarSet
///
/// A pod is updated when its recorded full hash for this SidecarSet equals
/// the SidecarSet's. It is upgradable in place only when the template change
/// is image-only, i.e. the without-image hashes agree.
#[derive(Debug, Clone)]
pub struct SidecarSetControl {
    pub name: String,
    pub hashes: TemplateHash,
    pub sidecar_names: Vec<String>,
}

impl SidecarSetControl {
    pub fn new(sidecarset: &SidecarSet) -> Result<Self, HashError> {
        Ok(Self {
            name: sidecarset.name_any(),
            hashes: TemplateHash::for_sidecarset(sidecarset)?,
            sidecar_names: sidecarset
                .spec
                .containers
                .iter()
                .map(|c| c.container.name.clone())
                .collect(),
        })
    }
}

impl UpgradeControl for SidecarSetControl {
    fn is_updated(&self, instance: &Instance) -> bool {
        instance.revision(&self.name) == Some(self.hashes.full.as_str())
    }

    fn is_upgradable(&self, instance: &Instance) -> bool {
        !instance.terminating
            && instance.is_injected(&self.name)
            && instance.revision_without_image(&self.name)
                == Some(self.hashes.without_image.as_str())
    }
}
