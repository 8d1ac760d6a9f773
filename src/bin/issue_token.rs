use std::io::{self, Write};

use clap::Parser;

use mailsync_api::auth::{AuthConfig, JwtService};

#[derive(Parser, Debug)]
#[command(
    name = "issue_token",
    about = "Mint an operator access token for the on-demand sync endpoints"
)]
struct Args {
    /// Who the token is issued to, recorded in request logs.
    #[arg(long)]
    subject: String,

    /// Role claim carried by the token.
    #[arg(long, default_value = "operator")]
    role: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let subject = args.subject.trim();
    if subject.is_empty() {
        writeln!(io::stderr(), "error: subject must not be empty")?;
        std::process::exit(1);
    }

    let config = AuthConfig::from_env();
    let Some(secret) = config.jwt_secret.as_deref() else {
        writeln!(io::stderr(), "error: MAILSYNC_JWT_SECRET is not set")?;
        std::process::exit(1);
    };

    let service = JwtService::new(secret, &config);
    let token = service.issue_access_token(subject, args.role.trim())?;

    writeln!(io::stdout(), "{}", token.token)?;
    writeln!(io::stderr(), "expires at {}", token.expires_at.to_rfc3339())?;
    Ok(())
}
