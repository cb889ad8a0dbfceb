use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use wastegate_nif::{Conversion, ProbeResult, can_convert, convert, probe};
use wastegate_schema::bethesda;


/// Pass a list of NIF file paths to the program. Each big-endian file is
/// converted and written next to the input as `<stem>.pc.nif` (or `.kf` for
/// animation content).
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let schema = bethesda::schema();
    let mut failures = 0usize;

    for path in std::env::args().skip(1) {
        if let Err(err) = convert_file(&schema, Path::new(&path)) {
            failures += 1;
            println!("{path}: {err:#}");
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} file(s) failed to convert");
    }
    Ok(())
}

fn convert_file(schema: &wastegate_schema::Schema, path: &Path) -> anyhow::Result<()> {
    let input = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let probed: ProbeResult = probe(&input, 0)
        .with_context(|| format!("{} does not look like a NIF container", path.display()))?;
    println!(
        "{}: {} blocks, {:?} content, {} bytes declared",
        path.display(),
        probed.num_blocks,
        probed.content,
        probed.estimated_size,
    );

    if !can_convert("nif", &probed) {
        println!("  already little-endian; nothing to do");
        return Ok(());
    }

    let Conversion { output, notes } = convert(schema, &input)
        .with_context(|| format!("converting {}", path.display()))?;
    for note in &notes {
        println!("  {note}");
    }

    let out_path = output_path(path, probed.content.extension());
    fs::write(&out_path, &output)
        .with_context(|| format!("writing {}", out_path.display()))?;
    println!(
        "  wrote {} ({} -> {} bytes)",
        out_path.display(),
        input.len(),
        output.len(),
    );
    Ok(())
}

fn output_path(input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "converted".to_owned());
    input.with_file_name(format!("{stem}.pc.{extension}"))
}
