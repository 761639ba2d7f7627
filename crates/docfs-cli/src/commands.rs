use std::fs::File;
use std::io;

use anyhow::{anyhow, bail, Context};
use colored::Colorize;
use docfs_sdk::blocking::DocFs;
use docfs_sdk::{
    Condition, Element, ElementQuery, FsConfig, MemoryStore, MetadataValue, ObjectId,
};

use crate::cli::*;

type Fs = DocFs<MemoryStore>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => FsConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FsConfig::default(),
    };
    config.snapshot_path = Some(cli.data.clone());
    tracing::debug!(data = %cli.data.display(), "opening snapshot");
    let fs = DocFs::open_snapshot(config)?;
    let format = cli.format;

    match cli.command {
        Command::Init => cmd_init(&fs, &cli.data)?,
        Command::Mkdir(args) => cmd_mkdir(&fs, args, format)?,
        Command::Put(args) => cmd_put(&fs, args, format)?,
        Command::Get(args) => cmd_get(&fs, args)?,
        Command::Ls(args) => cmd_ls(&fs, args, format)?,
        Command::Mv(args) => cmd_mv(&fs, args, format)?,
        Command::Cp(args) => cmd_cp(&fs, args, format)?,
        Command::Rename(args) => cmd_rename(&fs, args, format)?,
        Command::Rm(args) => cmd_rm(&fs, args)?,
        Command::Restore(args) => cmd_restore(&fs, args, format)?,
        Command::Find(args) => cmd_find(&fs, args, format)?,
        Command::Tag(args) => cmd_tag(&fs, args, format)?,
        Command::Untag(args) => cmd_untag(&fs, args, format)?,
        Command::Sweep => cmd_sweep(&fs)?,
        Command::Info(args) => cmd_info(&fs, args, format)?,
    }

    fs.save_snapshot()?;
    Ok(())
}

fn cmd_init(fs: &Fs, data: &std::path::Path) -> anyhow::Result<()> {
    println!("{} docfs ready in {}", "✓".green().bold(), data.display().to_string().bold());
    println!("  Root: {}", fs.root_id().to_string().cyan());
    Ok(())
}

fn cmd_mkdir(fs: &Fs, args: MkdirArgs, format: OutputFormat) -> anyhow::Result<()> {
    let parent = resolve(fs, &args.parent)?;
    let dir = fs.directories().create(&parent.id, &args.name)?;
    report(format, "Created", &dir)
}

fn cmd_put(fs: &Fs, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let parent = resolve(fs, &args.parent)?;
    let name = match args.name {
        Some(name) => name,
        None => args
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("cannot derive a name from {}", args.source.display()))?,
    };
    let mut source = File::open(&args.source)
        .with_context(|| format!("opening {}", args.source.display()))?;
    let file = fs.files().create_from_reader(&parent.id, &name, &mut source)?;
    report(format, "Uploaded", &file)
}

fn cmd_get(fs: &Fs, args: GetArgs) -> anyhow::Result<()> {
    let file = resolve(fs, &args.target)?;
    if !file.is_file() {
        bail!("{} is a directory", args.target);
    }
    match &args.output {
        Some(path) => {
            let mut out =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let n = fs.files().download_to(&file.id, &mut out)?;
            eprintln!("{} {} bytes to {}", "✓".green(), n, path.display());
        }
        None => {
            fs.files().download_to(&file.id, &mut io::stdout().lock())?;
        }
    }
    Ok(())
}

fn cmd_ls(fs: &Fs, args: LsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let dir = resolve(fs, &args.target)?;
    if dir.is_file() {
        return print_elements(format, std::slice::from_ref(&dir));
    }
    let listing = if args.recursive {
        fs.directories().list_recursive(&dir.id)?
    } else {
        fs.directories().list(&dir.id)?
    };
    print_elements(format, &listing)
}

fn cmd_mv(fs: &Fs, args: MvArgs, format: OutputFormat) -> anyhow::Result<()> {
    let target = resolve(fs, &args.target)?;
    let dest = resolve(fs, &args.destination)?;
    let moved = if target.is_directory() {
        fs.directories().move_to(&target.id, &dest.id)?
    } else {
        fs.files().move_to(&target.id, &dest.id)?
    };
    report(format, "Moved", &moved)
}

fn cmd_cp(fs: &Fs, args: CpArgs, format: OutputFormat) -> anyhow::Result<()> {
    let target = resolve(fs, &args.target)?;
    let dest = resolve(fs, &args.destination)?;
    if target.is_directory() {
        let created = fs.directories().copy(&target.id, &dest.id)?;
        match created.first() {
            Some(top) => report(format, "Copied", top)?,
            None => println!("{} nothing to copy", "!".yellow()),
        }
        if format == OutputFormat::Text && created.len() > 1 {
            println!("  {} elements created", created.len());
        }
        Ok(())
    } else {
        let copy = fs.files().copy(&target.id, &dest.id)?;
        report(format, "Copied", &copy)
    }
}

fn cmd_rename(fs: &Fs, args: RenameArgs, format: OutputFormat) -> anyhow::Result<()> {
    let target = resolve(fs, &args.target)?;
    let renamed = if target.is_directory() {
        fs.directories().rename(&target.id, &args.name)?
    } else {
        fs.files().rename(&target.id, &args.name)?
    };
    report(format, "Renamed", &renamed)
}

fn cmd_rm(fs: &Fs, args: RmArgs) -> anyhow::Result<()> {
    let target = resolve(fs, &args.target)?;
    if target.is_directory() {
        fs.directories().remove(&target.id, args.permanent)?;
    } else {
        fs.files().remove(&target.id, args.permanent)?;
    }
    let how = if args.permanent { "Deleted" } else { "Removed" };
    println!("{} {} {} ({})", "✓".green().bold(), how, target.name.yellow(), target.id.short_id().dimmed());
    Ok(())
}

fn cmd_restore(fs: &Fs, args: RestoreArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = ObjectId::parse(args.id)?;
    let element = fs
        .element(&id)?
        .ok_or_else(|| anyhow!("no element with id {id}"))?;
    let restored = if element.is_directory() {
        fs.directories().restore(&id)?
    } else {
        fs.files().restore(&id)?
    };
    report(format, "Restored", &restored)
}

fn cmd_find(fs: &Fs, args: FindArgs, format: OutputFormat) -> anyhow::Result<()> {
    let root = resolve(fs, &args.root)?;
    let mut query = ElementQuery::new().removed(args.removed);
    if let Some(name) = args.name {
        query = query.name(Condition::Eq(name.into()));
    }
    if let Some(needle) = args.contains {
        query = query.name(Condition::Contains(needle));
    }
    let found = fs.directories().find(&root.id, &query)?;
    print_elements(format, &found)
}

fn cmd_tag(fs: &Fs, args: TagArgs, format: OutputFormat) -> anyhow::Result<()> {
    let target = resolve(fs, &args.target)?;
    let value = parse_value(&args.value);
    let tagged = if target.is_directory() {
        fs.directories().set_custom_metadata(&target.id, &args.key, value)?
    } else {
        fs.files().set_custom_metadata(&target.id, &args.key, value)?
    };
    report(format, "Tagged", &tagged)
}

fn cmd_untag(fs: &Fs, args: UntagArgs, format: OutputFormat) -> anyhow::Result<()> {
    let target = resolve(fs, &args.target)?;
    let untagged = if target.is_directory() {
        fs.directories().remove_custom_metadata(&target.id, &args.key)?
    } else {
        fs.files().remove_custom_metadata(&target.id, &args.key)?
    };
    report(format, "Untagged", &untagged)
}

fn cmd_sweep(fs: &Fs) -> anyhow::Result<()> {
    let report = fs.recover()?;
    println!(
        "{} Sweep: {} objects reclaimed, {} dangling files dropped.",
        "✓".green(),
        report.reclaimed.len(),
        report.dangling.len()
    );
    Ok(())
}

fn cmd_info(fs: &Fs, args: InfoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let element = resolve(fs, &args.target)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&element)?);
        return Ok(());
    }
    println!("{} {}", kind_label(&element), element.name.bold());
    println!("  Id: {}", element.id.to_string().cyan());
    if let Some(parent) = &element.parent_id {
        println!("  Parent: {}", parent.to_string().dimmed());
    }
    if element.is_file() {
        println!("  Length: {}", element.length());
    }
    println!("  Created: {}", element.created.to_rfc3339());
    println!("  Modified: {}", element.modified.to_rfc3339());
    println!("  Opened: {}", element.opened.to_rfc3339());
    if element.removed {
        println!("  {}", "removed".red());
    }
    for (key, value) in &element.custom_metadata {
        println!("  {} = {}", key.yellow(), value);
    }
    Ok(())
}

/// Resolve a target to an element. A leading `/` walks live children from
/// the root by name; anything else is taken as an element id.
pub fn resolve(fs: &Fs, target: &str) -> anyhow::Result<Element> {
    let Some(path) = target.strip_prefix('/') else {
        let id = ObjectId::parse(target)?;
        return fs
            .element(&id)?
            .ok_or_else(|| anyhow!("no element with id {id}"));
    };

    let mut current = fs
        .element(fs.root_id())?
        .ok_or_else(|| anyhow!("filesystem has no root"))?;
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !current.is_directory() {
            bail!("{} is not a directory", current.name);
        }
        let children = fs
            .directories()
            .find(&current.id, &ElementQuery::by_parent(current.id.clone()))?;
        current = children
            .into_iter()
            .find(|c| !c.removed && c.name == segment)
            .ok_or_else(|| anyhow!("{target}: no such file or directory"))?;
    }
    Ok(current)
}

/// Interpret a command-line value, most specific type first.
pub fn parse_value(raw: &str) -> MetadataValue {
    if let Ok(b) = raw.parse::<bool>() {
        return b.into();
    }
    if let Ok(i) = raw.parse::<i64>() {
        return i.into();
    }
    if let Ok(f) = raw.parse::<f64>() {
        return f.into();
    }
    raw.into()
}

fn kind_label(element: &Element) -> colored::ColoredString {
    if element.is_directory() {
        "dir ".blue()
    } else {
        "file".normal()
    }
}

fn report(format: OutputFormat, verb: &str, element: &Element) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(element)?),
        OutputFormat::Text => println!(
            "{} {} {} ({})",
            "✓".green().bold(),
            verb,
            element.name.yellow(),
            element.id.short_id().dimmed()
        ),
    }
    Ok(())
}

fn print_elements(format: OutputFormat, elements: &[Element]) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(elements)?),
        OutputFormat::Text => {
            if elements.is_empty() {
                println!("{}", "(empty)".dimmed());
            }
            for element in elements {
                let size = if element.is_file() {
                    element.length().to_string()
                } else {
                    "-".to_string()
                };
                println!(
                    "{} {:>10}  {}  {}  {}",
                    kind_label(element),
                    size,
                    element.modified.format("%Y-%m-%d %H:%M"),
                    element.id.short_id().dimmed(),
                    element.name
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn memory_fs() -> Fs {
        DocFs::open(Arc::new(MemoryStore::new()), FsConfig::default()).unwrap()
    }

    #[test]
    fn resolve_walks_paths_and_ids() {
        let fs = memory_fs();
        let docs = fs.directories().create(fs.root_id(), "docs").unwrap();
        let file = fs.files().create(&docs.id, "a.txt", b"hi").unwrap();

        assert!(resolve(&fs, "/").unwrap().is_root());
        assert_eq!(resolve(&fs, "/docs").unwrap().id, docs.id);
        assert_eq!(resolve(&fs, "/docs/a.txt/").unwrap().id, file.id);
        assert_eq!(resolve(&fs, file.id.as_str()).unwrap().id, file.id);
        assert!(resolve(&fs, "/docs/missing").is_err());
        assert!(resolve(&fs, "/docs/a.txt/deeper").is_err());
    }

    #[test]
    fn resolve_skips_removed_children() {
        let fs = memory_fs();
        let docs = fs.directories().create(fs.root_id(), "docs").unwrap();
        fs.directories().remove(&docs.id, false).unwrap();
        assert!(resolve(&fs, "/docs").is_err());
        assert!(resolve(&fs, docs.id.as_str()).unwrap().removed);
    }

    #[test]
    fn values_parse_most_specific_first() {
        assert_eq!(parse_value("true"), MetadataValue::Bool(true));
        assert_eq!(parse_value("42"), MetadataValue::Int(42));
        assert_eq!(parse_value("2.5"), MetadataValue::Float(2.5));
        assert_eq!(parse_value("draft"), MetadataValue::Text("draft".into()));
    }
}
