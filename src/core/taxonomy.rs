use crate::utils::error::{CanonError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    pub id: u32,
    pub name: String,
    pub clusters: Vec<Cluster>,
}

#[derive(Debug, Deserialize)]
struct TaxonomyDocument {
    version: String,
    domains: Vec<Domain>,
}

/// A cluster together with the domain that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterInfo<'a> {
    pub domain: &'a Domain,
    pub cluster: &'a Cluster,
}

/// 兩層分類（domain → cluster），啟動時載入一次後唯讀
#[derive(Debug, Clone)]
pub struct Taxonomy {
    version: String,
    domains: Vec<Domain>,
    cluster_index: HashMap<u32, (usize, usize)>,
}

impl Taxonomy {
    /// 從 TOML 檔案載入分類
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(CanonError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let document: TaxonomyDocument =
            toml::from_str(content).map_err(|e| CanonError::TaxonomyError {
                message: format!("Taxonomy TOML parsing error: {}", e),
            })?;
        Self::from_domains(document.version, document.domains)
    }

    pub fn from_domains(version: String, domains: Vec<Domain>) -> Result<Self> {
        if domains.is_empty() {
            return Err(CanonError::TaxonomyError {
                message: "Taxonomy must contain at least one domain".to_string(),
            });
        }

        let mut domain_ids = std::collections::HashSet::new();
        let mut cluster_index = HashMap::new();

        for (domain_pos, domain) in domains.iter().enumerate() {
            if !domain_ids.insert(domain.id) {
                return Err(CanonError::TaxonomyError {
                    message: format!("Duplicate domain id {}", domain.id),
                });
            }
            for (cluster_pos, cluster) in domain.clusters.iter().enumerate() {
                if cluster_index
                    .insert(cluster.id, (domain_pos, cluster_pos))
                    .is_some()
                {
                    return Err(CanonError::TaxonomyError {
                        message: format!(
                            "Cluster id {} appears more than once (last seen in domain {})",
                            cluster.id, domain.id
                        ),
                    });
                }
            }
        }

        tracing::debug!(
            "Loaded taxonomy {} with {} domains and {} clusters",
            version,
            domains.len(),
            cluster_index.len()
        );

        Ok(Self {
            version,
            domains,
            cluster_index,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn cluster(&self, id: u32) -> Option<ClusterInfo<'_>> {
        let &(domain_pos, cluster_pos) = self.cluster_index.get(&id)?;
        let domain = &self.domains[domain_pos];
        Some(ClusterInfo {
            domain,
            cluster: &domain.clusters[cluster_pos],
        })
    }

    pub fn contains_cluster(&self, id: u32) -> bool {
        self.cluster_index.contains_key(&id)
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_index.len()
    }
}

#[cfg(test)]
pub(crate) fn shipped_taxonomy() -> Taxonomy {
    Taxonomy::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/data/taxonomy.toml"))
        .expect("shipped taxonomy loads")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipped_taxonomy_shape() {
        let taxonomy = shipped_taxonomy();
        assert_eq!(taxonomy.domain_count(), 10);
        assert_eq!(taxonomy.cluster_count(), 65);
        assert!(!taxonomy.version().is_empty());
    }

    #[test]
    fn test_cluster_lookup_resolves_owning_domain() {
        let taxonomy = shipped_taxonomy();

        let info = taxonomy.cluster(37).unwrap();
        assert_eq!(info.cluster.name, "Languages & Localization");
        assert_eq!(info.domain.id, 6);
        assert_eq!(info.domain.name, "Leadership & Professional Development");

        assert!(taxonomy.cluster(0).is_none());
        assert!(taxonomy.cluster(66).is_none());
        assert!(taxonomy.contains_cluster(65));
    }

    #[test]
    fn test_duplicate_cluster_id_rejected() {
        let content = r#"
version = "test"

[[domains]]
id = 1
name = "A"
clusters = [{ id = 1, name = "One" }]

[[domains]]
id = 2
name = "B"
clusters = [{ id = 1, name = "Also one" }]
"#;
        let err = Taxonomy::from_toml_str(content).unwrap_err();
        assert!(matches!(err, CanonError::TaxonomyError { .. }));
    }

    #[test]
    fn test_empty_taxonomy_rejected() {
        assert!(Taxonomy::from_domains("v".to_string(), vec![]).is_err());
        assert!(Taxonomy::from_toml_str("version = \"v\"\ndomains = []").is_err());
    }
}
