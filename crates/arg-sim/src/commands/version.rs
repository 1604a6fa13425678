use std::error::Error;

use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Emit JSON including enabled features.
    #[arg(long)]
    pub long: bool,
}

#[derive(Debug, Serialize)]
struct VersionInfo {
    version: &'static str,
    features: Vec<&'static str>,
}

pub fn run(args: &VersionArgs) -> Result<(), Box<dyn Error>> {
    if !args.long {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let mut features = Vec::new();
    if cfg!(feature = "mc3") {
        features.push("mc3");
    }
    if features.is_empty() {
        features.push("default");
    }
    let info = VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        features,
    };
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
