use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rendershot")]
#[command(
    version,
    about = "Render components to HTML or to PNG screenshots cropped to their content",
    long_about = "Rendershot\n\nServes GET/POST /render. `type=html` returns the assembled document; `type=png` loads it into a shared headless Chromium page and returns a PNG clipped to the rendered component.\n\nCLI flags override the config file; the config file overrides built-in defaults."
)]
pub struct Cli {
    #[arg(long, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        long,
        value_name = "PATH",
        help = "Config file (TOML); defaults to ./rendershot.toml when present"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, env = "PORT", help = "Port to listen on")]
    pub port: Option<u16>,

    #[arg(long, help = "Address to bind")]
    pub host: Option<String>,

    #[arg(long, value_name = "DIR", help = "Directory holding <Component>.html templates")]
    pub components_dir: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Chromium/Chrome executable to launch")]
    pub chrome: Option<PathBuf>,

    #[arg(long, help = "Launch the browser with --no-sandbox")]
    pub no_sandbox: bool,

    #[arg(
        long,
        env = "RENDERSHOT_EXPOSE_ERROR_DETAIL",
        help = "Include the error source chain in error responses"
    )]
    pub expose_error_detail: bool,
}

pub fn parse() -> Cli {
    Cli::parse()
}
