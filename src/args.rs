use crate::profile::DEFAULT_INI_SECTION;

pub use clap::Parser;

fn parse_header(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once(':')
        .ok_or_else(|| format!("Invalid header format: {s}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Invalid header format: {s}"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CommandLineArgs {
    #[clap(
        help = "text to clean; read from stdin when omitted and stdin is not a terminal. \
                Without text and with a terminal, the interactive form opens"
    )]
    text: Option<String>,
    #[clap(short = 't', long, help = "bearer token (remembered for the profile)")]
    token: Option<String>,
    #[clap(short = 'p', long, default_value = DEFAULT_INI_SECTION, help = "profile name")]
    profile: String,
    #[clap(short = 'e', long, help = "URL of the clean endpoint")]
    endpoint: Option<String>,
    #[clap(
        short = 'k',
        long,
        help = "Allow insecure server connections when using SSL"
    )]
    insecure: bool,
    #[clap(short = 'r', long, help = "CA certificate PEM file path")]
    ca_cert: Option<String>,
    #[clap(
        short = 'H',
        long = "header",
        value_name = "KEY: VALUE",
        value_parser = parse_header,
        help = "extra HTTP header to send with the request"
    )]
    headers: Vec<(String, String)>,
    #[clap(short = 'c', long, help = "copy the cleaned text to the clipboard")]
    copy: bool,
    #[clap(long, help = "clean locally without contacting the service")]
    offline: bool,
    #[clap(
        long,
        conflicts_with_all = ["text", "copy", "offline"],
        help = "check that the service is up and exit"
    )]
    health: bool,
    #[clap(
        short = 'v',
        long,
        help = "Print verbose message",
        default_value = "false"
    )]
    verbose: bool,
}

impl CommandLineArgs {
    pub fn get() -> Self {
        CommandLineArgs::parse()
    }

    pub fn text(&self) -> Option<&String> {
        self.text.as_ref()
    }

    pub fn token(&self) -> Option<&String> {
        self.token.as_ref()
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    pub fn endpoint(&self) -> Option<&String> {
        self.endpoint.as_ref()
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }

    pub fn ca_cert(&self) -> Option<&String> {
        self.ca_cert.as_ref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn copy(&self) -> bool {
        self.copy
    }

    pub fn offline(&self) -> bool {
        self.offline
    }

    pub fn health(&self) -> bool {
        self.health
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}
