use std::fs;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use tabula::spreadsheet::ImportFactory;
use tabula::{error_excerpt, Document, NsRepository, XmlMapper};

#[derive(Parser)]
#[command(about = "Map an XML document into sheets, optionally writing linked values back.")]
struct Args {
    /// Map definition file.
    #[arg(short, long)]
    map: PathBuf,

    /// Output file path for the sheet dump; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format: flat, csv, or none.
    #[arg(short = 'f', long = "output-format", default_value = "flat")]
    format: String,

    /// Re-emit the source document with current sheet values into FILE.
    #[arg(long, value_name = "FILE")]
    write_back: Option<PathBuf>,

    /// Input file.
    input: PathBuf,
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

    let content = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let map = fs::read(&args.map)
        .with_context(|| format!("failed to read {}", args.map.display()))?;

    let mut repo = NsRepository::new();
    let mut doc = Document::new();
    let mut mapper = XmlMapper::new(&mut repo);

    mapper
        .read_map_definition(&map, &mut doc)
        .map_err(|e| render_parse_error(e, &map))?;
    mapper
        .read_stream(&content, &mut doc)
        .map_err(|e| render_parse_error(e, &content))?;
    doc.finalize();

    if let Some(path) = &args.write_back {
        let mut out = fs::File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        mapper.write(&content, &doc, &mut out)?;
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(std::io::stdout()),
    };

    match args.format.as_str() {
        "flat" => doc.dump_flat(&mut out)?,
        "csv" => {
            let names: Vec<String> = doc.sheet_names().map(str::to_string).collect();
            for name in names {
                doc.dump_csv(&name, &mut out)?;
            }
        }
        "none" => {}
        other => bail!("unknown output format '{other}' (expected: flat|csv|none)"),
    }
    Ok(())
}

fn render_parse_error(err: tabula::Error, content: &[u8]) -> anyhow::Error {
    match err.offset() {
        Some(offset) => anyhow::anyhow!("{err}\n{}", error_excerpt(content, offset)),
        None => anyhow::anyhow!("{err}"),
    }
}
