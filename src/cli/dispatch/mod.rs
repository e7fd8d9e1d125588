use crate::cli::{
    actions::{
        Action,
        server::{Args, Backend},
    },
    commands::{ARG_AUTH_API_KEY, ARG_AUTH_URL, ARG_DSN, ARG_IN_MEMORY, ARG_PORT},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    let backend = if matches.get_flag(ARG_IN_MEMORY) {
        Backend::InMemory
    } else {
        let dsn = matches
            .get_one::<String>(ARG_DSN)
            .cloned()
            .context("missing required argument: --dsn")?;
        let auth_url = matches
            .get_one::<String>(ARG_AUTH_URL)
            .context("missing required argument: --auth-url")?;
        let auth_url = Url::parse(auth_url).context("invalid ACCTRAIL_AUTH_URL")?;
        let auth_api_key = matches
            .get_one::<String>(ARG_AUTH_API_KEY)
            .cloned()
            .context("missing required argument: --auth-api-key")?;

        Backend::Remote {
            dsn: SecretString::from(dsn),
            auth_url,
            auth_api_key: SecretString::from(auth_api_key),
        }
    };

    Ok(Action::Server(Args { port, backend }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn in_memory_backend() -> Result<()> {
        let matches = commands::new().try_get_matches_from(["acctrail", "--in-memory", "-p", "9000"])?;
        let Action::Server(args) = handler(&matches)?;
        assert_eq!(args.port, 9000);
        assert!(matches!(args.backend, Backend::InMemory));
        Ok(())
    }

    #[test]
    fn remote_backend() -> Result<()> {
        let matches = commands::new().try_get_matches_from([
            "acctrail",
            "--dsn",
            "postgres://localhost/acctrail",
            "--auth-url",
            "https://auth.acctrail.dev/auth/v1",
            "--auth-api-key",
            "anon-key",
        ])?;
        let Action::Server(args) = handler(&matches)?;
        let Backend::Remote {
            dsn,
            auth_url,
            auth_api_key,
        } = args.backend
        else {
            anyhow::bail!("expected remote backend");
        };
        assert_eq!(dsn.expose_secret(), "postgres://localhost/acctrail");
        assert_eq!(auth_url.host_str(), Some("auth.acctrail.dev"));
        assert_eq!(auth_api_key.expose_secret(), "anon-key");
        Ok(())
    }

    #[test]
    fn invalid_auth_url() -> Result<()> {
        let matches = commands::new().try_get_matches_from([
            "acctrail",
            "--dsn",
            "postgres://localhost/acctrail",
            "--auth-url",
            "not a url",
            "--auth-api-key",
            "anon-key",
        ])?;
        assert!(handler(&matches).is_err());
        Ok(())
    }
}
