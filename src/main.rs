//! CLI for Split-Bregman deconvolution of complex 3D volumes

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::level_filters::LevelFilter;

use sb_deblur::array_io;
use sb_deblur::{deblur, DeblurConfig, OutputMode};

#[derive(Parser)]
#[command(name = "sb-deblur")]
#[command(about = "Split-Bregman total-variation deblurring of a 3D volume", long_about = None)]
struct Cli {
    /// Blurred image file name (.cplx)
    #[arg(short = 'd', long, default_value = "blurred_image.cplx")]
    data: PathBuf,

    /// Kernel image file name (.cplx)
    #[arg(short = 'k', long, default_value = "kernel_image.cplx")]
    kernel: PathBuf,

    /// Result file name
    #[arg(short = 'r', long, default_value = "sb_deblurred_image.cplx")]
    result: PathBuf,

    /// Magnitude of the result (.real)
    #[arg(long, default_value = "sb_deblurred_image.real")]
    magnitude: PathBuf,

    /// Number of cg iterations
    #[arg(short = 'i', long)]
    cg_iterations: Option<usize>,

    /// Number of sb inner iterations
    #[arg(short = 'I', long)]
    inner_iterations: Option<usize>,

    /// Number of sb outer iterations
    #[arg(short = 'O', long)]
    outer_iterations: Option<usize>,

    /// Mu
    #[arg(short = 'M', long)]
    mu: Option<f64>,

    /// Lambda
    #[arg(short = 'L', long)]
    lambda: Option<f64>,

    /// TOML file with solver parameters; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    output_mode: Option<OutputMode>,
}

impl Cli {
    fn effective_config(&self) -> anyhow::Result<DeblurConfig> {
        let mut config = match &self.config {
            Some(path) => DeblurConfig::from_file(path)?,
            None => DeblurConfig::default(),
        };
        if let Some(v) = self.cg_iterations {
            config.cg_iterations = v;
        }
        if let Some(v) = self.inner_iterations {
            config.inner_iterations = v;
        }
        if let Some(v) = self.outer_iterations {
            config.outer_iterations = v;
        }
        if let Some(v) = self.mu {
            config.mu = v;
        }
        if let Some(v) = self.lambda {
            config.lambda = v;
        }
        if let Some(mode) = self.output_mode {
            config.output_mode = mode;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.effective_config()?;

    let level = match config.output_mode {
        OutputMode::Silent => LevelFilter::ERROR,
        OutputMode::Warnings => LevelFilter::WARN,
        OutputMode::Verbose => LevelFilter::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    println!(" Running deblurring with the following parameters: ");
    println!("   -d  blurred image      {}", cli.data.display());
    println!("   -k  kernel image       {}", cli.kernel.display());
    println!("   -r  result             {}", cli.result.display());
    println!("   -i  cg iterations      {}", config.cg_iterations);
    println!("   -I  inner iterations   {}", config.inner_iterations);
    println!("   -O  outer iterations   {}", config.outer_iterations);
    println!("   -M  mu                 {}", config.mu);
    println!("   -L  lambda             {}", config.lambda);

    let observation = array_io::read_complex(&cli.data)?
        .into_volume()
        .with_context(|| format!("blurred image {}", cli.data.display()))?;
    let kernel = array_io::read_complex(&cli.kernel)?
        .into_volume()
        .with_context(|| format!("kernel image {}", cli.kernel.display()))?;

    let output = deblur(&observation, &kernel, &config, None)?;

    array_io::write_volume(&cli.result, &output.image)?;
    if let Some(magnitude) = &output.magnitude {
        array_io::write_real(&cli.magnitude, &output.image.dims(), magnitude)?;
    }

    if let Some(last) = output.history.last() {
        tracing::info!(
            "done after {} outer iterations, objective {:.6e}",
            last.iteration,
            last.objective
        );
    }
    Ok(())
}
