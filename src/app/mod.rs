mod report;
mod runner;

pub use runner::run_sector;

use self::report::{report_sector, report_summary};
use crate::config::{Args, Config};
use crate::io::{print_summary, setup_output};
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use num_complex::Complex64;
use std::fs;
use tracing::info;

pub struct CcampApplication {
    args: Args,
    config: Config,
}

impl CcampApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let mut config = load_config(&args)?;
        config.apply_overrides(&args);
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref());
        info!("Configuration loaded from {}:\n{:#?}", self.args.config_file, self.config);

        let mut results = Vec::new();
        for (sector, skip) in self.config.sectors() {
            let result = if self.config.is_complex() {
                run_sector::<Complex64>(&self.config, sector, skip, self.args.restart)?
            } else {
                run_sector::<f64>(&self.config, sector, skip, self.args.restart)?
            };
            report_sector(&result);
            results.push(result);
        }
        report_summary(&results);

        let stdout = std::io::stdout();
        print_summary(&mut stdout.lock(), &results)?;
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults();
    config.validate()?;

    Ok(config)
}
