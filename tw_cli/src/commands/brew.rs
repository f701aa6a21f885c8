//! `tw brew` subcommands: tap management and publishing.

use console::style;

use tw_core::{BuildConfig, Context, Error, LogLevel, ReleaseVersionInfo, TestCommand};
use tw_io::{
    CargoBuilder, Collaborators, Database, EditorCommand, FormulaDetails, GhCli, GitCli,
    NotesSource, PublishRequest, ReleasePublisher, TapManager, package_name,
};

use crate::display::{ProgressStyles, create_publish_callback, finish_progress, format_tap_lines};
use crate::{BrewAction, PublishArgs};

pub async fn run(ctx: &Context, action: BrewAction) -> Result<(), Error> {
    let mut db = Database::open(&ctx.paths.database())?;
    let git = GitCli::new();
    let gh = GhCli::new();

    match action {
        BrewAction::ImportTap { path } => {
            println!(
                "{} Importing tap from {}...",
                style("==>").cyan().bold(),
                style(path.display()).bold()
            );
            let report = TapManager::new(&mut db, &git, &gh).import_tap(&path).await?;
            for (file, reason) in &report.skipped {
                println!(
                    "    {} skipped {}: {}",
                    style("!").yellow().bold(),
                    file.display(),
                    reason
                );
            }
            println!(
                "\n{} {} Imported {} with {} formula(s)",
                style("==>").cyan().bold(),
                style("✓").green().bold(),
                style(&report.tap.name).bold(),
                report.tap.formulas.len()
            );
        }

        BrewAction::TapList { json } => {
            let taps = TapManager::new(&mut db, &git, &gh).list_taps()?;
            if json {
                let out = serde_json::to_string_pretty(&taps).map_err(|e| Error::InvalidInput {
                    message: format!("failed to serialize taps: {}", e),
                })?;
                println!("{}", out);
            } else if taps.is_empty() {
                println!("{} No taps registered", style("==>").cyan().bold());
                println!(
                    "\n    → Import one with: {} brew import-tap <path>",
                    style("tw").cyan()
                );
            } else {
                println!("{} {} registered taps:", style("==>").cyan().bold(), taps.len());
                for tap in &taps {
                    println!();
                    for line in format_tap_lines(tap) {
                        println!("{}", line);
                    }
                }
            }
        }

        BrewAction::CreateTap {
            name,
            parent,
            private,
        } => {
            println!(
                "{} Creating tap {}...",
                style("==>").cyan().bold(),
                style(&name).bold()
            );
            let tap = TapManager::new(&mut db, &git, &gh)
                .create_tap(&name, &parent, private)
                .await?;
            println!(
                "\n{} {} Created {} at {}",
                style("==>").cyan().bold(),
                style("✓").green().bold(),
                style(&tap.name).bold(),
                tap.local_path.display()
            );
            println!("    remote: {}", tap.remote_path);
        }

        BrewAction::RemoveTap { name } => {
            let tap = TapManager::new(&mut db, &git, &gh).remove_tap(&name)?;
            println!(
                "{} {} Removed {} ({} formula(s)); {} was left in place",
                style("==>").cyan().bold(),
                style("✓").green().bold(),
                style(&tap.name).bold(),
                tap.formulas.len(),
                tap.local_path.display()
            );
        }

        BrewAction::RemoveFormula { tap, formula } => {
            TapManager::new(&mut db, &git, &gh).remove_formula(&tap, &formula)?;
            println!(
                "{} {} Removed {} from {}",
                style("==>").cyan().bold(),
                style("✓").green().bold(),
                style(&formula).bold(),
                tap
            );
        }

        BrewAction::Publish(args) => run_publish(ctx, &mut db, &git, &gh, args).await?,
    }

    Ok(())
}

fn notes_source(args: &PublishArgs) -> NotesSource {
    if let Some(text) = &args.notes {
        NotesSource::Text(text.clone())
    } else if let Some(path) = &args.notes_file {
        NotesSource::File(path.clone())
    } else if args.edit_notes {
        NotesSource::Edit
    } else {
        NotesSource::Generate
    }
}

fn test_command(arg: Option<&str>) -> Option<TestCommand> {
    match arg.map(str::trim) {
        None | Some("") => None,
        Some("default") => Some(TestCommand::DefaultCommand),
        Some(command) => Some(TestCommand::Custom(command.to_string())),
    }
}

async fn run_publish(
    ctx: &Context,
    db: &mut Database,
    git: &GitCli,
    gh: &GhCli,
    args: PublishArgs,
) -> Result<(), Error> {
    let project = std::path::absolute(&args.project).map_err(|e| Error::io(&args.project, e))?;
    let binary = match &args.target.bin {
        Some(bin) => bin.clone(),
        None => package_name(&project)?,
    };
    let install_name = args.name.clone().unwrap_or_else(|| binary.clone());

    let mut build = BuildConfig::new(ctx.paths.project_build_dir(&install_name));
    build.targets = args.target.targets();
    build.extra_args = args.target.build_args.clone();
    build.clean = args.target.clean;

    let request = PublishRequest {
        project_path: project,
        tap: args.tap.clone(),
        install_name: install_name.clone(),
        version: ReleaseVersionInfo::from_arg(&args.release_version),
        notes: notes_source(&args),
        upload_type: args.upload_type,
        build,
        details: FormulaDetails {
            description: args.description.clone(),
            homepage: args.homepage.clone(),
            license: args.license.clone(),
            test_command: test_command(args.test_command.as_deref()),
        },
        commit_message: args.message.clone(),
    };

    println!(
        "{} Publishing {} to {}...",
        style("==>").cyan().bold(),
        style(&install_name).bold(),
        style(&args.tap).bold()
    );

    let builder = CargoBuilder::new(Some(binary));
    let editor = EditorCommand::from_env();
    let tools = Collaborators {
        build_tool: &builder,
        source_control: git,
        release_host: gh,
        editor: &editor,
    };

    let (callback, current) = create_publish_callback(
        ProgressStyles::default(),
        ctx.log_level == LogLevel::Quiet,
    );
    let result = ReleasePublisher::new(db, tools, ctx.paths.notes_dir())
        .with_progress(callback)
        .publish(request)
        .await;
    finish_progress(&current);
    let outcome = result?;

    println!(
        "\n{} {} Published {} {}",
        style("==>").cyan().bold(),
        style("✓").green().bold(),
        style(&install_name).bold(),
        style(&outcome.version).green()
    );
    for url in &outcome.asset_urls {
        println!("    {}", url);
    }
    println!(
        "    formula {} {}",
        if outcome.created { "created at" } else { "updated at" },
        outcome.formula_path.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn publish_args(extra: &[&str]) -> PublishArgs {
        #[derive(Parser)]
        struct Wrapper {
            #[command(flatten)]
            args: PublishArgs,
        }
        let mut argv = vec!["publish", "--tap", "nntools", "--version", "1.0.0"];
        argv.extend_from_slice(extra);
        Wrapper::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn notes_source_from_flags() {
        assert_eq!(notes_source(&publish_args(&[])), NotesSource::Generate);
        assert_eq!(
            notes_source(&publish_args(&["--notes", "hi"])),
            NotesSource::Text("hi".into())
        );
        assert_eq!(
            notes_source(&publish_args(&["--notes-file", "NOTES.md"])),
            NotesSource::File("NOTES.md".into())
        );
        assert_eq!(notes_source(&publish_args(&["--edit-notes"])), NotesSource::Edit);
    }

    #[test]
    fn test_command_from_flag() {
        assert_eq!(test_command(None), None);
        assert_eq!(test_command(Some("default")), Some(TestCommand::DefaultCommand));
        assert_eq!(
            test_command(Some("mytool --help")),
            Some(TestCommand::Custom("mytool --help".into()))
        );
    }
}
