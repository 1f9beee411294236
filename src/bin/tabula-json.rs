use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use tabula::json::structure::StructureTree;
use tabula::spreadsheet::ImportFactory;
use tabula::{error_excerpt, Document, JsonMapper, JsonValue};

#[derive(Parser)]
#[command(about = "Convert, map, or analyze a JSON document.")]
struct Args {
    /// Mode of operation: convert, map, or structure.
    #[arg(long, default_value = "convert")]
    mode: String,

    /// Output file path; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: xml, json, check, or none.
    #[arg(short = 'f', long = "output-format")]
    format: Option<String>,

    /// Map definition file (map mode).
    #[arg(short, long)]
    map: Option<PathBuf>,

    /// Resolve JSON references to external files.
    #[arg(long)]
    resolve_refs: bool,

    /// Input file.
    input: PathBuf,
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Convert,
    Map,
    Structure,
}

fn parse_mode(input: &str) -> Result<Mode> {
    match input {
        "convert" => Ok(Mode::Convert),
        "map" => Ok(Mode::Map),
        "structure" => Ok(Mode::Structure),
        _ => bail!("unknown mode '{input}' (expected: convert|map|structure)"),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Format {
    Xml,
    Json,
    Check,
    None,
}

fn parse_format(input: &str) -> Result<Format> {
    match input {
        "xml" => Ok(Format::Xml),
        "json" => Ok(Format::Json),
        "check" => Ok(Format::Check),
        "none" => Ok(Format::None),
        _ => bail!("unknown output format '{input}' (expected: xml|json|check|none)"),
    }
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let mode = parse_mode(&args.mode)?;

    let content = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };

    match mode {
        Mode::Convert => {
            let format = match &args.format {
                Some(f) => parse_format(f)?,
                None => bail!("output format is not specified"),
            };
            let doc = parse_doc(&content, args.resolve_refs, &args.input)?;
            match format {
                Format::Xml => out.write_all(doc.dump_xml().as_bytes())?,
                Format::Json => {
                    out.write_all(doc.dump_json().as_bytes())?;
                    out.write_all(b"\n")?;
                }
                Format::Check => out.write_all(doc.dump_check().as_bytes())?,
                Format::None => {}
            }
        }
        Mode::Structure => {
            let doc = parse_doc(&content, args.resolve_refs, &args.input)?;
            let tree = StructureTree::analyze(&doc);
            out.write_all(tree.dump_compact().as_bytes())?;
        }
        Mode::Map => {
            let map_path = args
                .map
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("map mode requires --map"))?;
            let map = fs::read(map_path)
                .with_context(|| format!("failed to read {}", map_path.display()))?;

            let mut doc = Document::new();
            let mut mapper = JsonMapper::new();
            mapper
                .read_map_definition(&map, &mut doc)
                .map_err(|e| render_parse_error(e, &map))?;
            mapper
                .read_stream(&content, &mut doc)
                .map_err(|e| render_parse_error(e, &content))?;
            doc.finalize();

            if args.format.as_deref() != Some("none") {
                doc.dump_flat(&mut out)?;
            }
        }
    }
    Ok(())
}

fn parse_doc(content: &[u8], resolve_refs: bool, input: &Path) -> Result<JsonValue> {
    let mut doc =
        JsonValue::parse(content).map_err(|e| render_parse_error(e, content))?;
    if resolve_refs {
        let base = input.parent().unwrap_or(Path::new("."));
        resolve_references(&mut doc, base, 0)?;
    }
    Ok(doc)
}

/// Replace `{"$ref": "<path>"}` objects with the parsed content of the
/// referenced file, relative to the input document.
fn resolve_references(value: &mut JsonValue, base: &Path, depth: usize) -> Result<()> {
    if depth > 8 {
        bail!("reference nesting is too deep");
    }
    match value {
        JsonValue::Object(members) => {
            let reference = members
                .iter()
                .find(|(k, _)| k == "$ref")
                .and_then(|(_, v)| v.as_str().map(str::to_string));
            if let (Some(path), 1) = (&reference, members.len()) {
                let target = base.join(path);
                let bytes = fs::read(&target)
                    .with_context(|| format!("failed to read reference {}", target.display()))?;
                let mut resolved =
                    JsonValue::parse(&bytes).map_err(|e| render_parse_error(e, &bytes))?;
                let next_base = target.parent().unwrap_or(base).to_path_buf();
                resolve_references(&mut resolved, &next_base, depth + 1)?;
                *value = resolved;
                return Ok(());
            }
            for (_, member) in members.iter_mut() {
                resolve_references(member, base, depth)?;
            }
        }
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                resolve_references(item, base, depth)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn render_parse_error(err: tabula::Error, content: &[u8]) -> anyhow::Error {
    match err.offset() {
        Some(offset) => anyhow::anyhow!("{err}\n{}", error_excerpt(content, offset)),
        None => anyhow::anyhow!("{err}"),
    }
}
