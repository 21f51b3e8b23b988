use clap::CommandFactory;
use clap_complete::{generate_to, shells};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::io::Result;
use std::path::{Path, PathBuf};

#[path = "src/cli.rs"]
#[allow(dead_code)]
mod cli;

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let mut cmd = cli::Cli::command();

    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;
    render_man(&man_dir, cmd.clone(), "ethpm")?;
    for sub in cmd.get_subcommands() {
        let name = format!("ethpm-{}", sub.get_name());
        render_man(&man_dir, sub.clone(), &name)?;
    }

    let comp_dir = out_dir.join("completions");
    fs::create_dir_all(&comp_dir)?;
    generate_to(shells::Bash, &mut cmd, "ethpm", &comp_dir)?;
    generate_to(shells::Fish, &mut cmd, "ethpm", &comp_dir)?;
    generate_to(shells::Zsh, &mut cmd, "ethpm", &comp_dir)?;

    Ok(())
}

fn render_man(dir: &Path, cmd: clap::Command, name: &str) -> Result<()> {
    let mut buffer = Vec::new();
    Man::new(cmd).render(&mut buffer)?;
    fs::write(dir.join(format!("{name}.1")), buffer)
}
