use std::path::PathBuf;

use clap::Args;

use viewhost::logger::init_tracing;
use viewhost::schema::write_schema;

#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Directory the `*.schema.json` files are written to
    #[arg(long, default_value = "schemas")]
    pub out_dir: PathBuf,

    /// Optional log level override for the internal tracer
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

pub async fn execute(args: SchemaArgs) -> anyhow::Result<()> {
    init_tracing(&args.log_level, None)?;
    let files = write_schema(&args.out_dir)?;
    for file in &files {
        println!("{}", file.display());
    }
    println!("Schemas written to {}", args.out_dir.display());
    Ok(())
}
