use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ethpm",
    author,
    version,
    about = "Install, release and mirror ethPM packages"
)]
pub struct Cli {
    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install a package, by providing its URI, to your ethPM directory
    Install(InstallArgs),
    /// Remove an installed package
    Uninstall(UninstallArgs),
    /// List installed packages and their dependencies
    List(EthpmDirArgs),
    /// Poll for VersionRelease events and mirror the released packages
    Scrape(ScrapeArgs),
    /// Manage the local registry store
    #[command(subcommand)]
    Registry(RegistryCommand),
    /// Release a package on the active registry
    Release(ReleaseArgs),
    /// Store the keyfile used to sign releases, or show the stored one
    Auth(AuthArgs),
    /// Create an ethPM manifest from local smart contracts
    #[command(subcommand)]
    Create(CreateCommand),
}

#[derive(Args, Debug, Clone, Default)]
pub struct EthpmDirArgs {
    /// Path to a specific ethPM directory (defaults to ./_ethpm_packages)
    #[arg(long, value_name = "DIR")]
    pub ethpm_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Content, registry or blob URI of the package, or a registry alias
    pub uri: String,

    /// Directory name for the package (defaults to its package name)
    #[arg(long)]
    pub alias: Option<String>,

    #[command(flatten)]
    pub dir: EthpmDirArgs,

    /// Fetch content from a local node instead of the public gateway
    #[arg(long)]
    pub local_content_node: bool,

    /// Package to install from a registry given without one
    #[arg(long, requires = "package_version")]
    pub package_name: Option<String>,

    /// Version to install from a registry given without one
    #[arg(long, requires = "package_name")]
    pub package_version: Option<String>,

    /// Replace an existing install of the same alias
    #[arg(long)]
    pub force: bool,

    /// Ethereum JSON-RPC endpoint, for registry URIs
    #[arg(long, value_name = "URL")]
    pub rpc: Option<String>,
}

#[derive(Args, Debug)]
pub struct UninstallArgs {
    /// Alias or package name of the installed package
    pub package: String,

    #[command(flatten)]
    pub dir: EthpmDirArgs,
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Block number to begin scraping from on a chain's first run
    #[arg(long)]
    pub start_block: Option<u64>,

    /// Chain the RPC endpoint is expected to serve
    #[arg(long)]
    pub chain_id: Option<u64>,

    /// Directory to mirror content into (defaults to <root>/content)
    #[arg(long, value_name = "DIR")]
    pub content_dir: Option<PathBuf>,

    /// Only follow releases emitted by this registry contract
    #[arg(long, value_name = "ADDRESS")]
    pub registry: Option<String>,

    /// Ethereum JSON-RPC endpoint
    #[arg(long, value_name = "URL")]
    pub rpc: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RegistryCommand {
    /// Add a registry to the registry store
    Add {
        /// Registry URI, e.g. erc1319://0x...:1
        uri: String,
        /// Alias to reference this registry by
        #[arg(long)]
        alias: Option<String>,
    },
    /// Make a registry the active one
    Activate {
        /// Registry URI or alias
        uri_or_alias: String,
    },
    /// List known registries
    List,
    /// Deploy a new registry contract
    Deploy {
        /// Chain to deploy on
        #[arg(long)]
        chain_id: u64,
    },
}

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Package name; must match `package_name` in the manifest
    #[arg(long)]
    pub package_name: String,

    /// Version; must match `version` in the manifest
    #[arg(long = "version")]
    pub package_version: String,

    /// Content-addressed URI of the released manifest
    #[arg(long)]
    pub manifest_uri: String,

    /// Path to your keyfile (defaults to the stored one)
    #[arg(long, value_name = "PATH")]
    pub keyfile_path: Option<PathBuf>,

    /// Password to the keyfile
    #[arg(long)]
    pub keyfile_password: Option<String>,
}

#[derive(Args, Debug)]
pub struct AuthArgs {
    /// Path to your keyfile
    #[arg(long, value_name = "PATH")]
    pub keyfile_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ProjectDirArgs {
    /// Project directory holding `contracts/` and `build/`
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub project_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum CreateCommand {
    /// Generate a manifest packaging every source and contract type in a project
    BasicManifest {
        /// Package name for the generated manifest
        #[arg(long)]
        package_name: String,
        /// Package version for the generated manifest
        #[arg(long)]
        package_version: String,
        #[command(flatten)]
        project: ProjectDirArgs,
    },
    /// Generate solidity compiler standard JSON input for a project
    SolcInput {
        #[command(flatten)]
        project: ProjectDirArgs,
    },
    /// Interactively build a custom manifest
    ManifestWizard {
        #[command(flatten)]
        project: ProjectDirArgs,
    },
}
