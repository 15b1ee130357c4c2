use anyhow::{anyhow, Context, Result};
use plugin_twitch::{client::HelixClient, config::Config};

/// Print which of the logins given as arguments are live right now.
/// Needs TWITCH_CLIENT_ID and TWITCH_CLIENT_SECRET in the environment.
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let client_id = std::env::var("TWITCH_CLIENT_ID").context("twitch client id")?;
    let client_secret = std::env::var("TWITCH_CLIENT_SECRET").context("twitch client secret")?;
    let logins = std::env::args()
        .skip(1)
        .map(|l| l.to_lowercase())
        .collect::<Vec<_>>();
    if logins.is_empty() {
        return Err(anyhow!("usage: testtwitch <login>..."));
    }

    let config = Config::new(client_id.into(), client_secret.into());
    let client = HelixClient::new(&config)?;
    let cred = client
        .get_credential()
        .await
        .context("Cannot get app access token")?;

    let streams = client.query_live(&logins, &cred).await?;
    for login in &logins {
        match streams.iter().find(|s| s.user_login.eq_ignore_ascii_case(login)) {
            Some(s) => println!("{} is live, playing {}: {}", s.user_name, s.game_name, s.title),
            None => println!("{login} is offline"),
        }
    }

    Ok(())
}
