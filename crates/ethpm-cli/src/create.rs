//! Manifest construction from a local solidity project
//!
//! A project directory holds its sources under `contracts/` and, once
//! compiled, the compiler's standard JSON output at
//! `build/solc_output.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ethpm::validation::validate_alias;
use ethpm::{Error, ErrorKind};
use ethpm_common::Manifest;
use serde_json::{Value, json};
use walkdir::WalkDir;

use crate::CollaboratorMissing;
use crate::cli::CreateCommand;

/// Sources directory inside a project.
pub const CONTRACTS_DIR: &str = "contracts";
/// Compiler input written by `create solc-input`, inside [`CONTRACTS_DIR`].
pub const SOLC_INPUT_FILE: &str = "solc_input.json";
/// Compiler output read by `create basic-manifest`, relative to the project.
pub const SOLC_OUTPUT_FILE: &str = "build/solc_output.json";
/// Manifest written by `create basic-manifest`.
pub const MANIFEST_FILE: &str = "manifest.json";

pub(crate) async fn run(cmd: CreateCommand) -> miette::Result<()> {
    match cmd {
        CreateCommand::SolcInput { project } => {
            let sources = contract_sources(&project.project_dir)?;
            let path = project
                .project_dir
                .join(CONTRACTS_DIR)
                .join(SOLC_INPUT_FILE);
            let bytes = serde_json::to_vec_pretty(&solc_input(&sources))
                .map_err(|e| Error::validation(format!("cannot encode compiler input: {e}")))?;
            ethpm_store::fs::write_atomic(&path, &bytes)
                .await
                .map_err(Error::from)?;
            tracing::info!(
                "Solidity compiler input for {} sources written to {}",
                sources.len(),
                path.display()
            );
        }
        CreateCommand::BasicManifest {
            package_name,
            package_version,
            project,
        } => {
            let sources = contract_sources(&project.project_dir)?;
            let output = read_solc_output(&project.project_dir)?;
            let manifest = basic_manifest(&package_name, &package_version, &sources, &output)?;
            let path = project.project_dir.join(MANIFEST_FILE);
            ethpm_store::fs::write_atomic(&path, &canonical_bytes(&manifest)?)
                .await
                .map_err(Error::from)?;
            tracing::info!(
                "Manifest for {package_name}=={package_version} with {} sources and {} \
                 contract types written to {}",
                manifest.sources.len(),
                manifest.contract_types.len(),
                path.display()
            );
        }
        CreateCommand::ManifestWizard { project } => {
            contract_sources(&project.project_dir)?;
            read_solc_output(&project.project_dir)?;
            return Err(CollaboratorMissing {
                command: "create manifest-wizard",
                collaborator: "an interactive terminal collaborator",
            }
            .into());
        }
    }
    Ok(())
}

fn project_error(e: impl std::error::Error + Send + Sync + 'static, path: &Path) -> Error {
    Error::new(ErrorKind::Validation, Some(Box::new(e))).with_context(path.display().to_string())
}

/// Every `.sol` file under `<project>/contracts`, keyed by its `/`-separated
/// path relative to that directory.
pub fn contract_sources(project: &Path) -> ethpm::Result<BTreeMap<String, String>> {
    let contracts = project.join(CONTRACTS_DIR);
    if !contracts.is_dir() {
        return Err(Error::validation(format!(
            "{} has no {CONTRACTS_DIR}/ directory",
            project.display()
        ))
        .with_help("pass the project root with --project-dir"));
    }

    let mut sources = BTreeMap::new();
    for entry in WalkDir::new(&contracts)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("sol") {
            continue;
        }
        let Ok(relative) = path.strip_prefix(&contracts) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let text = std::fs::read_to_string(path).map_err(|e| project_error(e, path))?;
        sources.insert(key, text);
    }

    if sources.is_empty() {
        return Err(Error::validation(format!(
            "no .sol files under {}",
            contracts.display()
        )));
    }
    Ok(sources)
}

/// Compiler standard JSON input compiling `sources` with ABI, bytecode and
/// natspec output selected.
pub fn solc_input(sources: &BTreeMap<String, String>) -> Value {
    let sources: serde_json::Map<String, Value> = sources
        .iter()
        .map(|(path, text)| (path.clone(), json!({ "content": text })))
        .collect();
    json!({
        "language": "Solidity",
        "sources": sources,
        "settings": {
            "outputSelection": {
                "*": {
                    "*": [
                        "abi",
                        "evm.bytecode.object",
                        "evm.deployedBytecode.object",
                        "devdoc",
                        "userdoc"
                    ]
                }
            }
        }
    })
}

fn read_solc_output(project: &Path) -> ethpm::Result<Value> {
    let path: PathBuf = project.join(SOLC_OUTPUT_FILE);
    let bytes = std::fs::read(&path).map_err(|e| {
        project_error(e, &path).with_help("compile the project with `solc --standard-json` first")
    })?;
    serde_json::from_slice(&bytes).map_err(|e| project_error(e, &path))
}

/// Manifest with every source inlined and a contract type per compiled
/// contract in `solc_output`.
pub fn basic_manifest(
    package_name: &str,
    version: &str,
    sources: &BTreeMap<String, String>,
    solc_output: &Value,
) -> ethpm::Result<Manifest> {
    validate_alias(package_name)?;
    if version.trim().is_empty() {
        return Err(Error::validation("--package-version must not be empty"));
    }
    let contracts = solc_output
        .get("contracts")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::validation("compiler output has no `contracts` object"))?;

    let mut contract_types = BTreeMap::new();
    for (source_path, compiled) in contracts {
        let Some(compiled) = compiled.as_object() else {
            continue;
        };
        for (name, contract) in compiled {
            if contract_types
                .insert(name.clone(), contract_type(contract))
                .is_some()
            {
                return Err(Error::validation(format!(
                    "contract {name} in {source_path} is defined more than once"
                )));
            }
        }
    }

    let manifest = Manifest {
        manifest_version: "2".into(),
        package_name: package_name.into(),
        version: version.into(),
        meta: None,
        sources: sources
            .iter()
            .map(|(path, text)| (format!("./{path}"), text.clone()))
            .collect(),
        contract_types,
        deployments: BTreeMap::new(),
        build_dependencies: BTreeMap::new(),
    };
    manifest.sources()?;
    Ok(manifest)
}

fn contract_type(contract: &Value) -> Value {
    let mut out = serde_json::Map::new();
    if let Some(abi) = contract.get("abi") {
        out.insert("abi".into(), abi.clone());
    }
    for (pointer, key) in [
        ("/evm/bytecode/object", "deployment_bytecode"),
        ("/evm/deployedBytecode/object", "runtime_bytecode"),
    ] {
        if let Some(code) = contract
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
        {
            let code = code.strip_prefix("0x").unwrap_or(code);
            out.insert(key.into(), json!({ "bytecode": format!("0x{code}") }));
        }
    }
    let mut natspec = serde_json::Map::new();
    for doc in ["devdoc", "userdoc"] {
        if let Some(Value::Object(fields)) = contract.get(doc) {
            natspec.extend(fields.clone());
        }
    }
    if !natspec.is_empty() {
        out.insert("natspec".into(), Value::Object(natspec));
    }
    Value::Object(out)
}

/// Sorted keys, no whitespace, so equal manifests hash to the same address.
pub fn canonical_bytes(manifest: &Manifest) -> ethpm::Result<Vec<u8>> {
    let value = serde_json::to_value(manifest)
        .map_err(|e| Error::validation(format!("cannot encode manifest: {e}")))?;
    serde_json::to_vec(&value).map_err(|e| Error::validation(format!("cannot encode manifest: {e}")))
}
