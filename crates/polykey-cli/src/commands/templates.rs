//! Voice template commands.

use std::path::PathBuf;

use anyhow::bail;
use clap::{Args, Subcommand};
use polykey_config::{
    ensure_user_templates_dir, factory_template_names, get_factory_template, is_factory_template,
    list_user_templates, load_template, resolve_template, save_template, template_name_from_path,
    template_to_toml, user_templates_dir,
};

#[derive(Args)]
pub struct TemplatesArgs {
    #[command(subcommand)]
    command: TemplatesCommand,
}

#[derive(Subcommand)]
enum TemplatesCommand {
    /// List factory and user templates
    List,

    /// Print a template as TOML
    Show {
        /// Template name or path
        name: String,
    },

    /// Copy a factory template into the user templates directory
    Copy {
        /// Factory template name
        source: String,

        /// New template name (defaults to the source name)
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite an existing user template
        #[arg(long)]
        force: bool,
    },

    /// Check a template file without using it
    Validate {
        /// Template file
        path: PathBuf,
    },

    /// Show the templates directory
    Paths,
}

pub fn run(args: TemplatesArgs) -> anyhow::Result<()> {
    match args.command {
        TemplatesCommand::List => list_templates(),
        TemplatesCommand::Show { name } => {
            print!("{}", template_to_toml(&resolve_template(&name)?)?);
            Ok(())
        }
        TemplatesCommand::Copy {
            source,
            name,
            force,
        } => copy_template(&source, name.as_deref(), force),
        TemplatesCommand::Validate { path } => {
            let template = load_template(&path)?;
            println!("{}: '{}' is valid", path.display(), template.name);
            Ok(())
        }
        TemplatesCommand::Paths => {
            println!("User templates: {}", user_templates_dir().display());
            Ok(())
        }
    }
}

fn list_templates() -> anyhow::Result<()> {
    println!("Factory Templates:");
    println!("==================");
    for id in factory_template_names() {
        let display = get_factory_template(id).map(|t| t.name).unwrap_or_default();
        println!("  {id:20} - {display}");
    }
    println!();

    println!("User Templates:");
    println!("===============");
    let user = list_user_templates();
    if user.is_empty() {
        println!("  (none)");
        println!();
        println!("  Create one with: polykey templates copy <factory-name>\n");
        return Ok(());
    }
    for path in user {
        let id = template_name_from_path(&path).unwrap_or_else(|| "unknown".to_string());
        match load_template(&path) {
            Ok(t) => println!("  {id:20} - {}", t.name),
            Err(e) => println!("  {id:20} - (invalid: {e})"),
        }
    }
    println!();
    Ok(())
}

fn copy_template(source: &str, name: Option<&str>, force: bool) -> anyhow::Result<()> {
    if !is_factory_template(source) {
        bail!("'{source}' is not a factory template");
    }
    let mut template = resolve_template(source)?;
    let id = name.unwrap_or(source);
    if let Some(name) = name {
        template.name = name.to_string();
    }

    let dir = ensure_user_templates_dir()?;
    let path = dir.join(format!("{id}.toml"));
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    save_template(&template, &path)?;
    println!("Copied '{source}' to {}", path.display());
    Ok(())
}
