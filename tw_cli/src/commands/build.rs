//! Build command implementation.

use console::style;

use tw_core::{BuildConfig, Context, Error};
use tw_io::{ArchiveBuilder, CargoBuilder, copy_artifacts, package_name};

use crate::BuildArgs;
use crate::display::{ProgressStyles, format_artifact_line, spinner};

pub async fn run(ctx: &Context, args: BuildArgs) -> Result<(), Error> {
    let project = std::path::absolute(&args.project).map_err(|e| Error::io(&args.project, e))?;
    let name = match &args.target.bin {
        Some(bin) => bin.clone(),
        None => package_name(&project)?,
    };

    let mut config = BuildConfig::new(
        args.output
            .clone()
            .unwrap_or_else(|| ctx.paths.project_build_dir(&name)),
    );
    config.targets = args.target.targets();
    config.upload_type = args.upload_type;
    config.extra_args = args.target.build_args.clone();
    config.clean = args.target.clean;
    config.binary_name = Some(name.clone());

    let targets = config.resolved_targets();
    println!(
        "{} Building {} for {}...",
        style("==>").cyan().bold(),
        style(&name).bold(),
        targets
            .iter()
            .map(|a| a.label())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let styles = ProgressStyles::default();
    let pb = spinner(&styles, &name, "compiling...");
    let builder = CargoBuilder::new(Some(name.clone()));
    let result = ArchiveBuilder::new(&builder)
        .build(&project, &config, None)
        .await;
    pb.finish_and_clear();
    let artifacts = result?;

    for artifact in &artifacts {
        println!("{}", format_artifact_line(artifact));
    }

    if let Some(dir) = &args.copy_to {
        let copied = copy_artifacts(&artifacts, dir)?;
        println!(
            "{} Copied {} artifact(s) to {}",
            style("==>").cyan().bold(),
            copied.len(),
            dir.display()
        );
    }

    println!(
        "\n{} {} Built {} artifact(s)",
        style("==>").cyan().bold(),
        style("✓").green().bold(),
        artifacts.len()
    );

    if args.reveal {
        println!("{}", config.output_dir.display());
    }

    Ok(())
}
