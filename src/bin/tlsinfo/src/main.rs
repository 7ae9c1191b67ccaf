use std::{
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
};

use clap::Parser;
use miette::{IntoDiagnostic, WrapErr};
use tls_image::{TlsBlock, TlsImage, TlsVariant};

#[derive(clap::Subcommand, Clone, Debug)]
enum Commands {
    #[clap(about = "Print the TLS layout of an ELF file.")]
    Layout(LayoutCli),
    #[clap(about = "Write a freshly initialized TLS block for an ELF file.")]
    Dump(DumpCli),
}

#[derive(clap::Args, Clone, Debug)]
struct LayoutCli {
    /// ELF file to inspect
    file: PathBuf,
}

#[derive(clap::Args, Clone, Debug)]
struct DumpCli {
    /// ELF file to read the TLS image from
    file: PathBuf,
    /// Where to write the initialized block
    #[clap(short, long)]
    output: PathBuf,
}

#[derive(clap::Parser, Clone, Debug)]
#[clap(
    name = "tlsinfo",
    version = "0.1.0",
    about = "Inspect the thread-local storage image of an ELF file",
    long_about = None
)]
struct Cli {
    /// Log at DEBUG instead of INFO
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    cmd: Commands,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .finish(),
    )
    .into_diagnostic()?;

    match cli.cmd {
        Commands::Layout(layout_cli) => print_layout(&layout_cli, &mut std::io::stdout()),
        Commands::Dump(dump_cli) => dump_block(&dump_cli),
    }
}

fn read_file(path: &Path) -> miette::Result<Vec<u8>> {
    fs::read(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

/// The file's TLS image, or the empty image if it has no TLS segment.
fn load_image<'a>(path: &Path, data: &'a [u8]) -> miette::Result<TlsImage<'a>> {
    let image = TlsImage::from_elf(data)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read TLS image from {}", path.display()))?;
    Ok(image.unwrap_or_else(|| {
        tracing::info!("{}: no TLS segment", path.display());
        TlsImage::EMPTY
    }))
}

fn print_layout(cli: &LayoutCli, out: &mut impl Write) -> miette::Result<()> {
    let data = read_file(&cli.file)?;
    let image = load_image(&cli.file, &data)?;
    write!(out, "{}", Report(&image)).into_diagnostic()
}

fn dump_block(cli: &DumpCli) -> miette::Result<()> {
    let data = read_file(&cli.file)?;
    let image = load_image(&cli.file, &data)?;
    let block = TlsBlock::new(&image).into_diagnostic()?;
    fs::write(&cli.output, block.as_slice())
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to write {}", cli.output.display()))?;
    let formatter = humansize::make_format(humansize::BINARY);
    tracing::info!(
        "wrote TLS block ({}) to {}",
        formatter(block.as_slice().len()),
        cli.output.display()
    );
    Ok(())
}

struct Report<'a, 'b>(&'a TlsImage<'b>);

impl fmt::Display for Report<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = self.0.layout();
        let formatter = humansize::make_format(humansize::BINARY);
        writeln!(
            f,
            ".tdata     {:>10} (align {})",
            formatter(layout.data_size()),
            layout.data_align()
        )?;
        writeln!(
            f,
            ".tbss      {:>10} (align {}, at offset {})",
            formatter(layout.bss_size()),
            layout.bss_align(),
            layout.bss_offset()
        )?;
        writeln!(f, "footprint  {:>10}", formatter(layout.footprint()))?;
        for (name, variant) in [
            ("variant I", TlsVariant::Variant1 { tcb_size: 0 }),
            ("variant I+16", TlsVariant::Variant1 { tcb_size: 16 }),
            ("variant II", TlsVariant::Variant2),
        ] {
            match variant.stack_reservation(layout) {
                Ok(bytes) => writeln!(f, "stack ({}) {:>10}", name, formatter(bytes))?,
                Err(e) => writeln!(f, "stack ({}) {}", name, e)?,
            }
        }
        Ok(())
    }
}
