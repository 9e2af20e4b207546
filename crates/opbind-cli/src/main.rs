mod backends;
mod cli;
mod graph_file;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use opbind_core::{Opset, OpsetImports, DEFAULT_DOMAIN};
use opbind_session::{BackendRegistry, SessionConfig, SessionHandler};
use tracing_subscriber::EnvFilter;

use graph_file::GraphFile;

fn main() -> Result<()> {
    let cli = Cli::parse();

    std::env::set_var("RUST_LOG", &cli.log);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let registry = backends::bootstrap(cli.threads)?;

    match cli.command {
        Command::Resolve {
            graph,
            backend,
            fallback,
            no_fallback,
            opsets,
        } => {
            let file = GraphFile::load(&graph)?;
            let imports = if opsets.is_empty() {
                file.opsets().into_iter().collect()
            } else {
                opsets
                    .iter()
                    .map(|raw| parse_opset(raw))
                    .collect::<Result<OpsetImports>>()?
            };
            let fallback = fallback_for(&backend, &fallback, no_fallback);
            let config = session_config(&imports)?.with_fallback(fallback.is_some());
            let lines = resolve(&registry, &backend, fallback, config, &file)
                .with_context(|| format!("failed to resolve {}", graph.display()))?;
            for line in lines {
                println!("{line}");
            }
            Ok(())
        }
        Command::Ops { backend } => list_ops(&registry, &backend),
        Command::Backends => {
            for name in registry.names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn session_config(imports: &OpsetImports) -> Result<SessionConfig> {
    let onnx = imports
        .version_for(DEFAULT_DOMAIN)
        .with_context(|| format!("no opset import for {DEFAULT_DOMAIN}"))?;
    Ok(imports
        .iter()
        .cloned()
        .fold(SessionConfig::new(Opset::onnx(onnx)), SessionConfig::with_opset))
}

/// A fallback naming the primary backend is dropped rather than rejected,
/// so `--backend cpu` works with the default `--fallback cpu`.
fn fallback_for<'a>(primary: &str, fallback: &'a str, disabled: bool) -> Option<&'a str> {
    if disabled || fallback == primary {
        None
    } else {
        Some(fallback)
    }
}

fn resolve(
    registry: &BackendRegistry,
    primary: &str,
    fallback: Option<&str>,
    config: SessionConfig,
    file: &GraphFile,
) -> Result<Vec<String>> {
    let mut session = SessionHandler::from_registry(registry, primary, fallback, config)?;
    let nodes = file.nodes();
    session.resolve_graph(&nodes)?;

    Ok(session
        .bindings()
        .map(|(_, bound)| {
            format!(
                "{:<20} {:<28} -> {:<4} {:<14} ({})",
                bound.node(),
                bound.identity().to_string(),
                bound.backend(),
                bound.kind(),
                bound.origin()
            )
        })
        .collect())
}

fn list_ops(registry: &BackendRegistry, name: &str) -> Result<()> {
    let backend = registry
        .get(name)
        .with_context(|| format!("unknown backend: {name}"))?;
    for catalog in backend.catalogs().iter() {
        for (op, range) in catalog.entries() {
            println!("{:<14} {:<12} {}", catalog.domain(), op, range);
        }
    }
    Ok(())
}

fn parse_opset(raw: &str) -> Result<Opset> {
    let Some((domain, version)) = raw.rsplit_once(':') else {
        anyhow::bail!("invalid opset: {raw} (expected DOMAIN:VERSION)");
    };
    let version: u32 = version
        .parse()
        .with_context(|| format!("invalid opset version in {raw}"))?;
    Ok(Opset::new(domain, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_opset_accepts_empty_domain() -> Result<()> {
        assert_eq!(parse_opset(":13")?, Opset::onnx(13));
        assert_eq!(parse_opset("com.microsoft:1")?, Opset::new("com.microsoft", 1));
        assert!(parse_opset("ai.onnx").is_err());
        assert!(parse_opset("ai.onnx:x").is_err());
        Ok(())
    }

    #[test]
    fn session_config_requires_standard_domain() -> Result<()> {
        let imports: OpsetImports = [Opset::new("com.microsoft", 1)].into_iter().collect();
        assert!(session_config(&imports).is_err());

        let imports: OpsetImports = [Opset::onnx(11), Opset::new("com.microsoft", 1)]
            .into_iter()
            .collect();
        let config = session_config(&imports)?;
        assert_eq!(config.opsets.version_for(""), Some(11));
        assert_eq!(config.opsets.version_for("com.microsoft"), Some(1));
        Ok(())
    }

    const GRAPH: &str = r#"{
        "opset_import": [{"domain": "", "version": 11}],
        "nodes": [
            {"name": "sm", "op_type": "Softmax", "attributes": {"axis": 1}},
            {"name": "gemm", "op_type": "Gemm", "attributes": {"transB": 1}}
        ]
    }"#;

    #[test]
    fn cpu_primary_resolves_without_fallback() -> Result<()> {
        let registry = backends::bootstrap(1)?;
        let file = GraphFile::parse(GRAPH)?;
        let imports: OpsetImports = file.opsets().into_iter().collect();

        for (fallback, disabled) in [("cpu", true), ("cpu", false), ("par", true)] {
            let fallback = fallback_for("cpu", fallback, disabled);
            assert_eq!(fallback, None);
            let config = session_config(&imports)?.with_fallback(fallback.is_some());
            let lines = resolve(&registry, "cpu", fallback, config, &file)?;
            assert_eq!(lines.len(), 2);
            assert!(lines.iter().all(|l| l.contains("cpu") && l.ends_with("(primary)")));
        }
        Ok(())
    }

    #[test]
    fn par_primary_falls_back_to_cpu() -> Result<()> {
        let registry = backends::bootstrap(1)?;
        let file = GraphFile::parse(GRAPH)?;
        let imports: OpsetImports = file.opsets().into_iter().collect();

        let fallback = fallback_for("par", "cpu", false);
        assert_eq!(fallback, Some("cpu"));
        let config = session_config(&imports)?.with_fallback(true);
        let lines = resolve(&registry, "par", fallback, config, &file)?;
        assert!(lines.iter().all(|l| l.ends_with("(fallback)")));

        let config = session_config(&imports)?.with_fallback(false);
        let err = resolve(&registry, "par", None, config, &file)
            .err()
            .context("opset-11 Softmax has no par kernel")?;
        assert!(err.to_string().contains("unsupported operator 'Softmax'"));
        Ok(())
    }
}
