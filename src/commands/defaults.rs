//! `kubeforge defaults` - show and edit the stored AWS profile defaults

use anyhow::Result;
use std::path::Path;

use crate::Context;
use crate::cli::DefaultsCommand;
use crate::defaults::{AwsProfile, ProfileRequest};
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, cmd: DefaultsCommand) -> Result<()> {
    let path = paths::defaults_file()?;
    match cmd {
        DefaultsCommand::Show => show(&path),
        DefaultsCommand::Set { key, value } => set(ctx, &path, &key, &value),
        DefaultsCommand::Reset => reset(ctx, &path),
    }
}

fn show(path: &Path) -> Result<()> {
    let profile = AwsProfile::load_from(path)?;
    ui::header("Defaults");
    for (key, value) in profile.entries() {
        ui::kv(key, &value);
    }
    println!();
    if path.exists() {
        ui::dim(&format!("from {}", path.display()));
    } else {
        ui::dim("built-in values");
    }
    Ok(())
}

fn set(ctx: &Context, path: &Path, key: &str, value: &str) -> Result<()> {
    let request = ProfileRequest::single(key, value)?;
    let profile = AwsProfile::load_from(path)?.updated(&request);
    profile.save_to(path)?;
    if !ctx.quiet {
        ui::success(&format!("{key} = {value}"));
    }
    Ok(())
}

fn reset(ctx: &Context, path: &Path) -> Result<()> {
    let removed = AwsProfile::reset_at(path)?;
    if !ctx.quiet {
        if removed {
            ui::success("Defaults reset to built-in values");
        } else {
            ui::info("No stored defaults");
        }
    }
    Ok(())
}
