use clap::Parser;
use ftdc_parser::FtdcFile;

#[derive(Clone, Debug, Parser)]
#[clap(about, version, author)]
struct Config {
    /// FTDC capture file, e.g. diagnostic.data/metrics.2020-01-02T11-02-43Z-00000
    #[clap(long)]
    pub path: String,

    /// Limit the number of data chunks to decode (0 = all).
    #[clap(long, default_value_t = 0)]
    pub limit_chunks: usize,

    /// Don't print metrics whose whole series is zero.
    #[clap(long)]
    pub skip_zero_series: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::parse();
    println!("config: {:?}", config);

    let ftdc = FtdcFile::open(config.path.as_str()).await?;
    println!("records: {}", ftdc.records().len());
    println!("metrics begin: {}", ftdc.metrics_start());
    println!("metrics end:   {}", ftdc.metrics_end());

    let mut decoded = 0;
    for record in ftdc.data_records() {
        if config.limit_chunks > 0 && decoded >= config.limit_chunks {
            break;
        }
        decoded += 1;

        let series = match record.time_series().await {
            Ok(series) => series,
            Err(e) => {
                eprintln!("chunk {}: {}", record.id(), e);
                continue;
            }
        };

        println!(
            "chunk {}: {} metrics x {} samples",
            record.id(),
            series.metrics.len(),
            series.samples.len()
        );
        for metric in series.metrics.as_slice() {
            let values = series.values_for(&metric.path).unwrap_or_default();
            if config.skip_zero_series && values.iter().all(|v| *v == 0) {
                continue;
            }
            println!("  {}: {:?}", metric.path, values);
        }
    }

    Ok(())
}
