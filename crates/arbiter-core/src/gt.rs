//! Mode-aware ground-truth loading.
//!
//! Three strategies, selected by the configured GT type:
//! - `flat`: one GT file per contract (freeform, guidelines)
//! - `dual_part`: Part A redline GT plus Part B base-review GT (stacking)
//! - `per_contract_type`: one shared GT file per contract type (rules)
//!
//! A missing Part A is a normal, recoverable absence (not every contract
//! has adversarial redlines) and is modelled as [`GtPart::Absent`].
//! Missing required files, unparsable files and uninferable contract
//! types are errors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{GtKind, GtPattern, ModeConfig};
use crate::fields::extract_contract_type;
use crate::scoring::points::{PointsError, TierWeightTable};
use crate::scoring::detection::{Detection, Tier};

/// Errors from ground-truth loading.
#[derive(Error, Debug)]
pub enum GtError {
    #[error("ground truth file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("invalid ground truth format in {path}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("cannot infer contract type for {contract:?} (known types: {known:?})")]
    TypeInferenceFailed {
        contract: String,
        known: Vec<String>,
    },

    #[error("cannot read ground truth file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Issue count for one tier in the GT file's summary block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TierCount {
    #[serde(default)]
    pub count: usize,
}

/// Persisted tier summary from a GT file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct TierSummary {
    #[serde(rename = "T1", default)]
    pub t1: TierCount,
    #[serde(rename = "T2", default)]
    pub t2: TierCount,
    #[serde(rename = "T3", default)]
    pub t3: TierCount,
    #[serde(default)]
    pub weighted_max: f64,
}

impl TierSummary {
    pub fn count(&self, tier: Tier) -> usize {
        match tier {
            Tier::T1 => self.t1.count,
            Tier::T2 => self.t2.count,
            Tier::T3 => self.t3.count,
        }
    }

    /// Recompute the weighted maximum from tier counts and a weight table.
    ///
    /// The persisted `weighted_max` must equal this pure function of the
    /// counts; callers surface a mismatch as a data-quality warning.
    pub fn expected_weighted_max(&self, table: &TierWeightTable) -> Result<f64, PointsError> {
        let mut total = 0.0;
        for tier in Tier::ALL {
            let count = self.count(tier);
            if count > 0 {
                total += count as f64 * table.points(Detection::Y, tier)?;
            }
        }
        Ok(total)
    }

    /// Whether the persisted weighted_max matches the recomputed value.
    pub fn weighted_max_consistent(&self, table: &TierWeightTable) -> Result<bool, PointsError> {
        let expected = self.expected_weighted_max(table)?;
        Ok((expected - self.weighted_max).abs() < 1e-9)
    }
}

/// Parsed ground-truth file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroundTruthFile {
    #[serde(default)]
    pub gt_metadata: Value,
    #[serde(default)]
    pub ground_truth: Vec<Value>,
    #[serde(default)]
    pub tier_summary: Option<TierSummary>,
    /// Counter-party redlines for stacking Part A files.
    #[serde(default)]
    pub part_a_cp_redlines: Vec<Value>,
}

impl GroundTruthFile {
    /// Empty placeholder used for absent parts.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A loaded GT file with its source path.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedGt {
    pub file: GroundTruthFile,
    pub path: PathBuf,
}

/// One part of a dual-part GT, which may legitimately be absent.
#[derive(Debug, Clone, PartialEq)]
pub enum GtPart {
    Present(LoadedGt),
    Absent,
}

impl GtPart {
    pub fn is_present(&self) -> bool {
        matches!(self, GtPart::Present(_))
    }

    /// The file, or an empty placeholder when absent.
    pub fn file(&self) -> GroundTruthFile {
        match self {
            GtPart::Present(loaded) => loaded.file.clone(),
            GtPart::Absent => GroundTruthFile::empty(),
        }
    }
}

/// Shape-specific load result.
#[derive(Debug, Clone, PartialEq)]
pub enum GtData {
    Flat(LoadedGt),
    DualPart { part_a: GtPart, part_b: GtPart },
    PerContractType {
        contract_type: String,
        gt: LoadedGt,
    },
}

/// Result of a GT load with source provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct GtLoadResult {
    pub data: GtData,
    pub source_files: Vec<PathBuf>,
}

/// Mode-aware ground-truth loader.
pub struct GtLoader<'a> {
    mode_dir: PathBuf,
    config: &'a ModeConfig,
}

impl<'a> GtLoader<'a> {
    pub fn new(mode_dir: impl Into<PathBuf>, config: &'a ModeConfig) -> Self {
        Self {
            mode_dir: mode_dir.into(),
            config,
        }
    }

    fn gt_dir(&self) -> PathBuf {
        self.mode_dir.join(&self.config.paths.ground_truth)
    }

    /// Load GT for a contract respecting the mode configuration.
    pub fn load(
        &self,
        contract: &str,
        contract_type: Option<&str>,
    ) -> Result<GtLoadResult, GtError> {
        match self.config.gt_structure.kind {
            GtKind::Flat => self.load_flat(contract),
            GtKind::DualPart => self.load_dual_part(contract),
            GtKind::PerContractType => self.load_per_contract_type(contract, contract_type),
        }
    }

    fn load_flat(&self, contract: &str) -> Result<GtLoadResult, GtError> {
        let pattern = match &self.config.paths.gt_pattern {
            Some(GtPattern::Single(p)) => p.as_str(),
            _ => "{contract}.json",
        };
        let path = self.gt_dir().join(pattern.replace("{contract}", contract));
        let file = read_gt_file(&path)?;
        Ok(GtLoadResult {
            data: GtData::Flat(LoadedGt {
                file,
                path: path.clone(),
            }),
            source_files: vec![path],
        })
    }

    fn load_dual_part(&self, contract: &str) -> Result<GtLoadResult, GtError> {
        let gt_dir = self.gt_dir();
        let (part_a_pattern, part_b_pattern) = match &self.config.paths.gt_pattern {
            Some(GtPattern::PerPart { part_a, part_b }) => (
                part_a.as_deref().unwrap_or("{contract}_part_a.json"),
                part_b
                    .as_deref()
                    .unwrap_or("../freeform/ground_truth/{contract}.json"),
            ),
            _ => (
                "{contract}_part_a.json",
                "../freeform/ground_truth/{contract}.json",
            ),
        };

        // Part A: stacking-named file first, then the configured pattern.
        // Not every contract has adversarial redlines, so absence is fine.
        let mut part_a_path = gt_dir.join(format!("{contract}_stacking.json"));
        if !part_a_path.exists() {
            part_a_path = gt_dir.join(part_a_pattern.replace("{contract}", contract));
        }

        let mut source_files = Vec::new();
        let part_a = if part_a_path.exists() {
            let file = read_gt_file(&part_a_path)?;
            source_files.push(part_a_path.clone());
            GtPart::Present(LoadedGt {
                file,
                path: part_a_path,
            })
        } else {
            tracing::debug!(contract, "no Part A ground truth; using empty placeholder");
            GtPart::Absent
        };

        // Part B: base-mode ground truth.
        let part_b_path = gt_dir.join(part_b_pattern.replace("{contract}", contract));
        let part_b = if part_b_path.exists() {
            let file = read_gt_file(&part_b_path)?;
            source_files.push(part_b_path.clone());
            GtPart::Present(LoadedGt {
                file,
                path: part_b_path,
            })
        } else {
            tracing::warn!(
                contract,
                path = %part_b_path.display(),
                "Part B ground truth missing"
            );
            GtPart::Absent
        };

        Ok(GtLoadResult {
            data: GtData::DualPart { part_a, part_b },
            source_files,
        })
    }

    fn load_per_contract_type(
        &self,
        contract: &str,
        contract_type: Option<&str>,
    ) -> Result<GtLoadResult, GtError> {
        let contract_type = match contract_type {
            Some(ct) => ct.to_lowercase(),
            None => self.infer_contract_type(contract)?,
        };

        let gt_dir = self.gt_dir();
        let files = if self.config.gt_structure.files.is_empty() {
            vec![format!("{contract_type}.json")]
        } else {
            self.config.gt_structure.files.clone()
        };

        let file_name = files
            .iter()
            .find(|f| f.to_lowercase().contains(&contract_type))
            .ok_or_else(|| GtError::NotFound {
                path: gt_dir.join(format!("{contract_type}.json")),
            })?;

        let path = gt_dir.join(file_name);
        let file = read_gt_file(&path)?;
        Ok(GtLoadResult {
            data: GtData::PerContractType {
                contract_type,
                gt: LoadedGt {
                    file,
                    path: path.clone(),
                },
            },
            source_files: vec![path],
        })
    }

    fn infer_contract_type(&self, contract: &str) -> Result<String, GtError> {
        extract_contract_type(contract, &self.config.contract_types).ok_or_else(|| {
            GtError::TypeInferenceFailed {
                contract: contract.to_string(),
                known: self.config.contract_types.clone(),
            }
        })
    }
}

fn read_gt_file(path: &Path) -> Result<GroundTruthFile, GtError> {
    if !path.exists() {
        return Err(GtError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = fs::read_to_string(path).map_err(|source| GtError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|e| GtError::InvalidFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GtStructure;
    use serde_json::json;

    fn write_json(path: &Path, value: &Value) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    }

    fn gt_file_value() -> Value {
        json!({
            "gt_metadata": {"version": "4"},
            "ground_truth": [
                {"gt_id": "GT-01", "clause": "5.1", "tier": "T1", "issue": "Uncapped liability"}
            ],
            "tier_summary": {"T1": {"count": 1}, "T2": {"count": 0}, "T3": {"count": 0}, "weighted_max": 8.0}
        })
    }

    #[test]
    fn test_load_flat() {
        let dir = tempfile::tempdir().unwrap();
        write_json(
            &dir.path().join("ground_truth/consulting.json"),
            &gt_file_value(),
        );

        let config = ModeConfig::bare("freeform");
        let loader = GtLoader::new(dir.path(), &config);
        let result = loader.load("consulting", None).unwrap();

        match result.data {
            GtData::Flat(loaded) => {
                assert_eq!(loaded.file.ground_truth.len(), 1);
                assert!(loaded.file.tier_summary.is_some());
            }
            other => panic!("expected flat, got {other:?}"),
        }
    }

    #[test]
    fn test_load_flat_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ground_truth")).unwrap();

        let config = ModeConfig::bare("freeform");
        let loader = GtLoader::new(dir.path(), &config);
        assert!(matches!(
            loader.load("missing", None),
            Err(GtError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_flat_unparsable_is_invalid_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ground_truth/bad.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        let config = ModeConfig::bare("freeform");
        let loader = GtLoader::new(dir.path(), &config);
        assert!(matches!(
            loader.load("bad", None),
            Err(GtError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_dual_part_with_absent_part_a() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = dir.path().join("freeform_stacking");
        write_json(
            &dir.path().join("freeform/ground_truth/consulting.json"),
            &gt_file_value(),
        );
        fs::create_dir_all(mode_dir.join("ground_truth")).unwrap();

        let mut config = ModeConfig::bare("freeform_stacking");
        config.gt_structure = GtStructure {
            kind: GtKind::DualPart,
            ..Default::default()
        };

        let loader = GtLoader::new(&mode_dir, &config);
        let result = loader.load("consulting", None).unwrap();

        match result.data {
            GtData::DualPart { part_a, part_b } => {
                assert!(!part_a.is_present());
                assert!(part_a.file().ground_truth.is_empty());
                assert!(part_b.is_present());
            }
            other => panic!("expected dual part, got {other:?}"),
        }
        assert_eq!(result.source_files.len(), 1);
    }

    #[test]
    fn test_dual_part_prefers_stacking_file() {
        let dir = tempfile::tempdir().unwrap();
        let mode_dir = dir.path().join("freeform_stacking");
        write_json(
            &mode_dir.join("ground_truth/consulting_stacking.json"),
            &json!({"part_a_cp_redlines": [{"test_id": "CP-01"}]}),
        );

        let mut config = ModeConfig::bare("freeform_stacking");
        config.gt_structure.kind = GtKind::DualPart;

        let loader = GtLoader::new(&mode_dir, &config);
        let result = loader.load("consulting", None).unwrap();

        match result.data {
            GtData::DualPart { part_a, .. } => {
                assert!(part_a.is_present());
                assert_eq!(part_a.file().part_a_cp_redlines.len(), 1);
            }
            other => panic!("expected dual part, got {other:?}"),
        }
    }

    #[test]
    fn test_per_contract_type_inference() {
        let dir = tempfile::tempdir().unwrap();
        write_json(
            &dir.path().join("ground_truth/consulting.json"),
            &gt_file_value(),
        );

        let mut config = ModeConfig::bare("rules");
        config.gt_structure.kind = GtKind::PerContractType;
        config.contract_types = vec!["consulting".to_string(), "dpa".to_string()];

        let loader = GtLoader::new(dir.path(), &config);
        let result = loader.load("consulting_v3", None).unwrap();

        match result.data {
            GtData::PerContractType { contract_type, .. } => {
                assert_eq!(contract_type, "consulting");
            }
            other => panic!("expected per contract type, got {other:?}"),
        }
    }

    #[test]
    fn test_per_contract_type_inference_failure() {
        let mut config = ModeConfig::bare("rules");
        config.gt_structure.kind = GtKind::PerContractType;
        config.contract_types = vec!["consulting".to_string()];

        let dir = tempfile::tempdir().unwrap();
        let loader = GtLoader::new(dir.path(), &config);
        assert!(matches!(
            loader.load("lease_2024", None),
            Err(GtError::TypeInferenceFailed { .. })
        ));
    }

    #[test]
    fn test_weighted_max_invariant() {
        let summary = TierSummary {
            t1: TierCount { count: 2 },
            t2: TierCount { count: 3 },
            t3: TierCount { count: 1 },
            weighted_max: 32.0,
        };
        let table = TierWeightTable::standard();
        // 2*8 + 3*5 + 1*1 = 32
        assert_eq!(summary.expected_weighted_max(&table).unwrap(), 32.0);
        assert!(summary.weighted_max_consistent(&table).unwrap());

        let drifted = TierSummary {
            weighted_max: 30.0,
            ..summary
        };
        assert!(!drifted.weighted_max_consistent(&table).unwrap());
    }
}
