use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::PipelineFile;
use crate::config::validate::Pipeline;
use crate::error::Result;

/// Read and deserialize a pipeline file without semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<PipelineFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let raw: PipelineFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Read a pipeline file and validate it, graph included.
pub fn load_pipeline(path: impl AsRef<Path>) -> Result<Pipeline> {
    Pipeline::try_from(load_from_path(path)?)
}

/// Parse and validate a pipeline held in memory.
pub fn from_toml_str(contents: &str) -> Result<Pipeline> {
    let raw: PipelineFile = toml::from_str(contents)?;
    Pipeline::try_from(raw)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("pipeline.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GraphError, StardagError};
    use crate::task::TaskKind;
    use crate::Scalar;

    const MINIMAL: &str = r#"
[task.begin]
kind = "noop"

[task.stage]
kind = "extract_load"
source_uri = "s3://bucket/log_data"
target_table = "staging_events"
format = "JSON 'auto'"
after = ["begin"]
max_attempts = 2

[task.check]
kind = "quality_check"
after = ["stage"]
probes = [{ query = "SELECT COUNT(*) FROM staging_events", expected = 0 }]
"#;

    #[test]
    fn defaults_apply_when_sections_are_missing() {
        let pipeline = from_toml_str(MINIMAL).unwrap();
        assert_eq!(pipeline.max_concurrency, 4);
        assert_eq!(pipeline.retry.max_attempts, 4);
        assert_eq!(pipeline.retry.delay.as_secs(), 300);
        assert_eq!(pipeline.credentials.access_key_id_env, "AWS_ACCESS_KEY_ID");
        assert_eq!(pipeline.warehouse.max_connections, 5);
    }

    #[test]
    fn tasks_and_edges_are_built() {
        let pipeline = from_toml_str(MINIMAL).unwrap();
        let graph = &pipeline.graph;
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.dependencies_of("check"), ["stage".to_string()]);
        assert_eq!(graph.task("stage").unwrap().max_attempts, Some(2));
        match &graph.task("check").unwrap().kind {
            TaskKind::QualityCheck(qc) => {
                assert_eq!(qc.probes.len(), 1);
                assert_eq!(qc.probes[0].expected, Scalar::Int(0));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn unknown_dependency_is_a_graph_error() {
        let err = from_toml_str(
            r#"
[task.a]
kind = "noop"
after = ["ghost"]
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StardagError::Graph(GraphError::UnknownTask { ref unknown, .. }) if unknown == "ghost"
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = from_toml_str(&format!("[run]\nmax_concurrency = 0\n{MINIMAL}")).unwrap_err();
        assert!(matches!(err, StardagError::Config(msg) if msg.contains("max_concurrency")));
    }

    #[test]
    fn zero_attempt_override_is_rejected() {
        let err = from_toml_str(
            r#"
[task.a]
kind = "noop"
max_attempts = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(err, StardagError::Config(msg) if msg.contains("'a'")));
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let err = from_toml_str("[run]\nmax_concurrency = 2\n").unwrap_err();
        assert!(matches!(err, StardagError::Config(_)));
    }

    #[test]
    fn unknown_kind_fails_to_parse() {
        let err = from_toml_str(
            r#"
[task.a]
kind = "spark_job"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, StardagError::Config(msg) if msg.contains("spark_job")));
    }

    #[test]
    fn misspelled_parameter_is_rejected() {
        let err = from_toml_str(
            r#"
[task.users]
kind = "dimension_load"
target_table = "users"
generating_query = "SELECT DISTINCT userid FROM staging_events"
truncate_frist = true
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            StardagError::Config(ref msg) if msg.contains("'users'") && msg.contains("truncate_frist")
        ));
    }

    #[test]
    fn noop_rejects_parameters() {
        let err = from_toml_str(
            r#"
[task.begin]
kind = "noop"
target_table = "songplays"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, StardagError::Config(msg) if msg.contains("target_table")));
    }

    #[test]
    fn misspelled_probe_field_is_rejected() {
        let err = from_toml_str(
            r#"
[task.check]
kind = "quality_check"
probes = [{ query = "SELECT COUNT(*) FROM songplays", expect = 0 }]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, StardagError::Config(msg) if msg.contains("'check'")));
    }
}
