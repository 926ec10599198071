use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use storybook::navigation::SpreadView;
use storybook::{Chapter, ExportFormat, ManuscriptBuilder, StorybookViewer, Viewport};

/// Opens a sample storybook, pages through it and writes every export format.
///
/// The PDF export needs fonts: put the Roboto family under `assets/fonts`, point
/// `STORYBOOK_FONTS_DIR` at a directory holding it, or install Liberation Sans / DejaVu Sans.
#[derive(Parser)]
#[command(author, version, about = "Render the sample storybook in every export format")]
struct Cli {
    /// Directory that receives the exported files.
    #[arg(long, default_value = "target/storybook_demo")]
    out_dir: PathBuf,

    /// Only export the given formats (repeatable).
    #[arg(long = "format", value_enum)]
    formats: Vec<FormatArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Pdf,
    Docx,
    Html,
    Markdown,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Pdf => ExportFormat::Pdf,
            FormatArg::Docx => ExportFormat::Docx,
            FormatArg::Html => ExportFormat::Html,
            FormatArg::Markdown => ExportFormat::Markdown,
        }
    }
}

const PROSE: &str = "The lighthouse keeper counted the waves the way other people counted sheep. \
*One* for the harbour, *two* for the rocks, and a **third** for the boat that never came home. ";

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let manuscript = Arc::new(
        ManuscriptBuilder::new("Echoes of the Shore", "Ada Quill")
            .with_subtitle("Three Tides")
            .with_chapter(Chapter::new("Low Tide", PROSE.repeat(12)))
            .with_chapter(Chapter::new("High Tide", PROSE.repeat(16)))
            .with_chapter(Chapter::new("Slack Water", PROSE.repeat(8)))
            .build(),
    );

    let mut viewer = StorybookViewer::new();
    viewer.resize(Viewport::new(420.0, 560.0));
    viewer.fonts_settled();
    viewer.open(Arc::clone(&manuscript));
    println!(
        "'{}': {} page(s) in {} spread(s)",
        manuscript.title(),
        viewer.page_count(),
        viewer.total_spreads()
    );

    while viewer.next() {
        viewer.finish_turn();
        if let SpreadView::Spread { left, right } = viewer.view() {
            match right {
                Some(right) => println!("  spread: pages {left} and {right}"),
                None => println!("  spread: page {left}"),
            }
        }
    }

    let formats: Vec<ExportFormat> = if cli.formats.is_empty() {
        ExportFormat::ALL.to_vec()
    } else {
        cli.formats.into_iter().map(ExportFormat::from).collect()
    };

    fs::create_dir_all(&cli.out_dir)?;
    for format in formats {
        match viewer.export(format) {
            Ok(artifact) => {
                let path = cli.out_dir.join(&artifact.file_name);
                fs::write(&path, &artifact.bytes)?;
                println!(
                    "{:>8}: {} ({} bytes)",
                    format.label(),
                    path.display(),
                    artifact.bytes.len()
                );
            }
            Err(err) => {
                eprintln!("{:>8}: failed: {}", err.format_label(), err);
                print_error_sources(&err);
            }
        }
    }

    Ok(())
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {}", err);
        print_error_sources(err.as_ref());
        std::process::exit(1);
    }
}

fn print_error_sources(mut error: &(dyn Error + 'static)) {
    while let Some(source) = error.source() {
        eprintln!("  caused by: {}", source);
        error = source;
    }
}
