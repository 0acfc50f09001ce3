use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::encoder::Encoder;
use crate::progress::Progress;
use crate::tables::Codec;
use camino::Utf8PathBuf;
use clap::Parser;
use ohno::IntoAppError;
use std::io::Write;

#[derive(Parser, Debug)]
pub struct EncodeArgs {
    /// Directory holding the per-category `.json` and `.stock.json` source files
    #[arg(long, short = 'i', value_name = "DIR")]
    pub input: Utf8PathBuf,

    /// Directory receiving the encoded tables and the archive
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output: Utf8PathBuf,

    /// Compression for the tables (defaults to the configured one)
    #[arg(long, value_name = "CODEC")]
    pub compression: Option<Codec>,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub async fn encode_tables<H: Host>(host: &mut H, args: &EncodeArgs) -> Result<()> {
    let common = Common::new(&args.common)?;
    let codec = args.compression.unwrap_or(common.config.compression);
    let encoder = Encoder::new(codec, common.config.archive_name.clone());

    let input = args.input.clone().into_std_path_buf();
    let output = args.output.clone().into_std_path_buf();
    let progress = common.progress.clone();
    let summary = tokio::task::spawn_blocking(move || encoder.encode_dir(&input, &output, &progress))
        .await
        .into_app_err("encoder task failed")??;
    common.progress.done();

    for skipped in &summary.skipped {
        let _ = writeln!(host.error(), "Skipped {}: {}", skipped.file.display(), skipped.reason);
    }

    let _ = writeln!(
        host.output(),
        "Encoded {} components in {} categories with {} distinct attributes in {:.1}s",
        summary.components,
        summary.categories,
        summary.attributes,
        summary.elapsed.as_secs_f64()
    );
    let _ = writeln!(host.output(), "Archive: {}", summary.archive.display());
    Ok(())
}
