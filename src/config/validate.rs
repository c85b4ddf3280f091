// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, RundagError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RundagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.config, raw.node))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_nodes(cfg)?;
    validate_global_config(cfg)?;
    validate_nodes(cfg)?;
    validate_node_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_nodes(cfg: &RawConfigFile) -> Result<()> {
    if cfg.node.is_empty() {
        return Err(RundagError::ConfigError(
            "config must contain at least one [node.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.config.max_parallelism == Some(0) {
        return Err(RundagError::ConfigError(
            "[config].max_parallelism must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_nodes(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        if name.trim().is_empty() {
            return Err(RundagError::ConfigError(
                "node names must not be empty".to_string(),
            ));
        }
        if node.operator.trim().is_empty() {
            return Err(RundagError::ConfigError(format!(
                "node '{name}' has an empty `operator`"
            )));
        }
    }
    Ok(())
}

fn validate_node_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, node) in cfg.node.iter() {
        for dep in node.after.iter() {
            if dep == name {
                return Err(RundagError::ConfigError(format!(
                    "node '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.node.contains_key(dep) {
                return Err(RundagError::ConfigError(format!(
                    "node '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> node, so `after = ["A"]` on B adds A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.node.keys() {
        graph.add_node(name.as_str());
    }

    for (name, node) in cfg.node.iter() {
        for dep in node.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(RundagError::DagCycle(format!(
            "cycle detected in node DAG involving node '{}'",
            cycle.node_id()
        ))),
    }
}
