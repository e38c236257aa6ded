//! novakit CLI
//!
//! Command-line interface for inspecting and repacking Novalogic game files:
//! pack archives, missions, models, terrain and encrypted scripts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use novakit_core::Error as CoreError;
use novakit_parsers::logging::{self, TracingConfig};
use novakit_parsers::pack::PackHeader;
use novakit_parsers::script;
use novakit_parsers::{
    check_files, GameKey, HumanReadable, MissionParser, ModelParser, NoLookup, PackArchive, PackParser, ParseOptions,
    Parser as _, ScriptFile, ScriptParser, TerrainParser, GLOBAL_REGISTRY,
};

/// novakit - Novalogic file inspection and repacking tool
#[derive(Parser)]
#[command(name = "novakit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format for structured data
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Treat soft structural diagnostics as errors
    #[arg(long, global = true)]
    strict: bool,

    /// Do not enforce declared record lengths
    #[arg(long, global = true)]
    no_length_checks: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with PFF pack archives
    #[command(subcommand)]
    Pack(PackCommand),

    /// Inspect BMS mission files
    #[command(subcommand)]
    Mission(MissionCommand),

    /// Inspect 3DI model files
    #[command(subcommand)]
    Model(ModelCommand),

    /// Inspect CPT terrain files
    #[command(subcommand)]
    Terrain(TerrainCommand),

    /// Encrypt or decrypt SCR scripts
    #[command(subcommand)]
    Script(ScriptCommand),

    /// Decode and re-encode files, reporting any byte differences
    Check(CheckArgs),

    /// List the supported formats
    Formats,
}

#[derive(Subcommand)]
enum PackCommand {
    /// List archive entries
    List {
        archive: PathBuf,
    },
    /// Extract entries to a directory
    Extract(ExtractArgs),
    /// Add or replace entries from files
    Add(AddArgs),
    /// Remove entries by name
    Remove {
        archive: PathBuf,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Create a new archive from files
    Create(CreateArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Path to the PFF archive
    archive: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Entry names to extract (all entries when omitted)
    names: Vec<String>,

    /// Decrypt script entries while extracting
    #[arg(long)]
    decrypt: bool,

    /// Script key as a hex seed (Joint Operations key when omitted)
    #[arg(long)]
    key: Option<String>,
}

#[derive(Args)]
struct AddArgs {
    /// Path to the PFF archive
    archive: PathBuf,

    /// Files to add; the entry name is the file name
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Store payloads with BFC1 compression
    #[arg(long)]
    compress: bool,
}

#[derive(Args)]
struct CreateArgs {
    /// Path of the archive to write
    archive: PathBuf,

    /// Files to store
    files: Vec<PathBuf>,

    /// Store payloads with BFC1 compression
    #[arg(long)]
    compress: bool,

    /// Write a PFF3 signature instead of PFF4
    #[arg(long)]
    pff3: bool,

    /// Overwrite an existing archive
    #[arg(long)]
    overwrite: bool,
}

#[derive(Subcommand)]
enum MissionCommand {
    /// Header summary and section counts
    Info { path: PathBuf },
    /// Every decoded field
    Dump { path: PathBuf },
    /// Entity placements
    Entities { path: PathBuf },
    /// Event scripts with their triggers and actions
    Script {
        path: PathBuf,
        /// Include raw record bytes
        #[arg(long)]
        raw: bool,
    },
}

#[derive(Subcommand)]
enum ModelCommand {
    /// Chunk tree outline
    Tree { path: PathBuf },
    /// Model name, node count and unrecognised chunk ids
    Info { path: PathBuf },
}

#[derive(Subcommand)]
enum TerrainCommand {
    /// Header, depth map and quadtree summary
    Info { path: PathBuf },
    /// Raw height at a grid position
    Height { path: PathBuf, x: u32, y: u32 },
}

#[derive(Subcommand)]
enum ScriptCommand {
    /// Decrypt an SCR file
    Decrypt(CipherArgs),
    /// Encrypt a plaintext file
    Encrypt(CipherArgs),
}

#[derive(Args)]
struct CipherArgs {
    input: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Key as a hex seed (Joint Operations key when omitted)
    #[arg(long)]
    key: Option<String>,
}

#[derive(Args)]
struct CheckArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_with_config(TracingConfig::for_verbosity(cli.verbose));

    let options = ParseOptions {
        strict_validation: cli.strict,
        check_record_lengths: !cli.no_length_checks,
        ..ParseOptions::default()
    };

    match cli.command {
        Commands::Pack(command) => cmd_pack(command, &options, cli.format),
        Commands::Mission(command) => cmd_mission(command, &options, cli.format),
        Commands::Model(command) => cmd_model(command, &options, cli.format),
        Commands::Terrain(command) => cmd_terrain(command, &options, cli.format),
        Commands::Script(command) => cmd_script(command),
        Commands::Check(args) => cmd_check(args, &options, cli.format),
        Commands::Formats => cmd_formats(cli.format),
    }
}

/// Decode a file, logging soft diagnostics and mapping codec errors
fn load<P: novakit_parsers::Parser>(parser: &P, path: &Path, options: &ParseOptions) -> Result<P::Output> {
    if !path.exists() {
        return Err(CoreError::FileNotFound(path.to_path_buf()).into());
    }

    let start = std::time::Instant::now();
    novakit_parsers::log_parse_start!(parser.name(), path);

    let decoded = parser.decode_file(path, options).map_err(|e| CoreError::Decode {
        format: parser.name().to_string(),
        message: e.to_string(),
    })?;

    for diagnostic in &decoded.report.diagnostics {
        warn!("{}: {diagnostic}", path.display());
    }
    let bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    novakit_parsers::log_parse_complete!(parser.name(), start.elapsed(), bytes);

    Ok(decoded.value)
}

fn save<P: novakit_parsers::Parser>(parser: &P, value: &P::Output, path: &Path) -> Result<()> {
    let bytes = parser.serialize(value).map_err(|e| CoreError::Encode {
        format: parser.name().to_string(),
        message: e.to_string(),
    })?;
    fs::write(path, &bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn emit<T: HumanReadable>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", value.to_readable_string()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&value.to_json())?),
        OutputFormat::Yaml => print!("{}", value.to_yaml()),
    }
    Ok(())
}

fn parse_key(key: Option<&str>) -> Result<GameKey> {
    match key {
        None => Ok(GameKey::JointOps),
        Some(text) => {
            let digits = text.trim_start_matches("0x").trim_start_matches("0X");
            let seed = u32::from_str_radix(digits, 16).with_context(|| format!("Invalid key: {text}"))?;
            Ok(GameKey::Custom(seed))
        }
    }
}

fn entry_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("No file name in {}", path.display()))
}

fn add_files(archive: &mut PackArchive, files: &[PathBuf], compress: bool) -> Result<()> {
    for file in files {
        let name = entry_name(file)?;
        let data = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
        if compress {
            archive.add_compressed(&name, &data)?;
        } else {
            archive.add_entry(&name, data);
        }
        info!("Added {name}");
    }
    Ok(())
}

fn cmd_pack(command: PackCommand, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    let parser = PackParser::new();

    match command {
        PackCommand::List { archive } => {
            let archive = load(&parser, &archive, options).context("Failed to parse PFF archive")?;
            match format {
                OutputFormat::Text => {
                    println!("{:<16} {:<10} {:<7} {:>10} {:>8}", "Name", "Size", "Kind", "Modified", "CRC32");
                    println!("{:-<16} {:-<10} {:-<7} {:->10} {:->8}", "", "", "", "", "");
                    for info in archive.listing() {
                        println!(
                            "{:<16} {:<10} {:<7} {:>10} {:08X}",
                            info.name,
                            info.formatted_size(),
                            info.kind(),
                            info.modified,
                            info.crc32
                        );
                    }
                    println!("\nTotal: {} entries, {} bytes", archive.len(), archive.total_size());
                }
                _ => emit(&archive, format)?,
            }
        }
        PackCommand::Extract(args) => {
            let key = parse_key(args.key.as_deref())?;
            let archive = load(&parser, &args.archive, options).context("Failed to parse PFF archive")?;

            let entries: Vec<_> = if args.names.is_empty() {
                archive.entries().iter().collect()
            } else {
                args.names
                    .iter()
                    .map(|name| archive.get(name).with_context(|| format!("No entry named {name}")))
                    .collect::<Result<_>>()?
            };

            fs::create_dir_all(&args.output).context("Failed to create output directory")?;

            let mut failures = Vec::new();
            for entry in entries {
                let name = entry.filename();
                let written = entry
                    .decoded()
                    .map_err(CoreError::from)
                    .and_then(|data| {
                        if args.decrypt && script::is_script(&data) {
                            script::decrypt(&data, key).map_err(CoreError::from)
                        } else {
                            Ok(data)
                        }
                    })
                    .and_then(|data| {
                        let target = args.output.join(Path::new(&name).file_name().unwrap_or_default());
                        fs::write(&target, data).map_err(CoreError::from)
                    });

                match written {
                    Ok(()) => info!("Extracted {name}"),
                    Err(e) => {
                        warn!("Failed to extract {name}: {e}");
                        failures.push(e.with_context(name));
                    }
                }
            }

            if !failures.is_empty() {
                return Err(CoreError::Multiple(failures).into());
            }
        }
        PackCommand::Add(args) => {
            let mut archive = load(&parser, &args.archive, options).context("Failed to parse PFF archive")?;
            add_files(&mut archive, &args.files, args.compress)?;
            save(&parser, &archive, &args.archive)?;
        }
        PackCommand::Remove { archive: path, names } => {
            let mut archive = load(&parser, &path, options).context("Failed to parse PFF archive")?;
            for name in &names {
                if archive.remove(name).is_none() {
                    bail!("No entry named {name}");
                }
            }
            save(&parser, &archive, &path)?;
        }
        PackCommand::Create(args) => {
            if args.archive.exists() && !args.overwrite {
                bail!("{} already exists (use --overwrite)", args.archive.display());
            }
            let header = PackHeader {
                signature: if args.pff3 { *b"PFF3" } else { *b"PFF4" },
                ..PackHeader::default()
            };
            let mut archive = PackArchive::with_header(header);
            add_files(&mut archive, &args.files, args.compress)?;
            save(&parser, &archive, &args.archive)?;
        }
    }
    Ok(())
}

fn cmd_mission(command: MissionCommand, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    let parser = MissionParser::new();

    match command {
        MissionCommand::Info { path } => {
            let mission = load(&parser, &path, options)?;
            match format {
                OutputFormat::Text => print!("{}", mission.to_readable_string()),
                _ => println!("{}", serde_json::to_string_pretty(&mission.header)?),
            }
        }
        MissionCommand::Dump { path } => {
            let mission = load(&parser, &path, options)?;
            match format {
                OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&mission.to_json())?),
                _ => emit(&mission, format)?,
            }
        }
        MissionCommand::Entities { path } => {
            let mission = load(&parser, &path, options)?;
            print!("{}", mission.entity_listing(&NoLookup));
        }
        MissionCommand::Script { path, raw } => {
            let mission = load(&parser, &path, options)?;
            println!("{}", mission.script_listing(raw));
        }
    }
    Ok(())
}

fn cmd_model(command: ModelCommand, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    let parser = ModelParser::new();

    match command {
        ModelCommand::Tree { path } => {
            let model = load(&parser, &path, options)?;
            emit(&model, format)?;
        }
        ModelCommand::Info { path } => {
            let model = load(&parser, &path, options)?;
            let unknown: Vec<String> = model.unknown_ids().iter().map(ToString::to_string).collect();
            let summary = serde_json::json!({
                "version": model.version,
                "name": model.name(),
                "nodes": model.root.node_count(),
                "unknown_ids": unknown,
            });
            match format {
                OutputFormat::Text => {
                    println!("Version: {}", model.version);
                    println!("Name:    {}", model.name().unwrap_or_default());
                    println!("Nodes:   {}", model.root.node_count());
                    if !unknown.is_empty() {
                        println!("Unknown: {}", unknown.join(", "));
                    }
                }
                _ => println!("{}", serde_json::to_string_pretty(&summary)?),
            }
        }
    }
    Ok(())
}

fn cmd_terrain(command: TerrainCommand, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    let parser = TerrainParser::new();

    match command {
        TerrainCommand::Info { path } => {
            let terrain = load(&parser, &path, options)?;
            emit(&terrain, format)?;
        }
        TerrainCommand::Height { path, x, y } => {
            let terrain = load(&parser, &path, options)?;
            match terrain.height_at(x, y) {
                Some(height) => println!("{height}"),
                None => bail!("{} has no depth map", path.display()),
            }
        }
    }
    Ok(())
}

fn cmd_script(command: ScriptCommand) -> Result<()> {
    match command {
        ScriptCommand::Decrypt(args) => {
            let parser = ScriptParser::with_key(parse_key(args.key.as_deref())?);
            let script = load(&parser, &args.input, &ParseOptions::default())?;
            match args.output {
                Some(output) => fs::write(&output, &script.plain)
                    .with_context(|| format!("Failed to write {}", output.display()))?,
                None => print!("{}", script.text()),
            }
        }
        ScriptCommand::Encrypt(args) => {
            let parser = ScriptParser::with_key(parse_key(args.key.as_deref())?);
            let plain = fs::read(&args.input).with_context(|| format!("Failed to read {}", args.input.display()))?;
            let script = ScriptFile::new(plain, parser.key());
            let output = args.output.unwrap_or_else(|| args.input.with_extension("scr"));
            save(&parser, &script, &output)?;
        }
    }
    Ok(())
}

fn cmd_check(args: CheckArgs, options: &ParseOptions, format: OutputFormat) -> Result<()> {
    novakit_parsers::init_registry();
    let results = check_files(&GLOBAL_REGISTRY, &args.files, options);

    match format {
        OutputFormat::Text => {
            for check in &results {
                let status = match &check.result {
                    Ok(trip) if trip.identical => format!("ok ({} bytes)", trip.input_len),
                    Ok(trip) => format!(
                        "DIFFERS at byte {} ({} -> {} bytes)",
                        trip.first_difference.unwrap_or_default(),
                        trip.input_len,
                        trip.output_len
                    ),
                    Err(message) => format!("FAILED: {message}"),
                };
                println!("{}: {status}", check.path.display());
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(&results)?),
    }

    let failed = results.iter().filter(|check| !check.passed()).count();
    if failed > 0 {
        bail!("{failed} of {} files did not round-trip", results.len());
    }
    Ok(())
}

fn cmd_formats(format: OutputFormat) -> Result<()> {
    novakit_parsers::init_registry();
    let parsers = GLOBAL_REGISTRY.list();

    match format {
        OutputFormat::Text => {
            for parser in &parsers {
                println!("{:<10} {:<28} .{}", parser.id, parser.name, parser.extensions.join(", ."));
                println!("           {}", parser.description);
            }
        }
        _ => println!("{}", serde_json::to_string_pretty(&parsers)?),
    }
    Ok(())
}
