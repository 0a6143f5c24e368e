//! `CollabTodo` auth CLI
//!
//! Browser login with PKCE and token management from a terminal.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use collabtodo_auth::{
    api::ApiClient,
    cli::{Cli, Command, TokenKind},
    config::Config,
    oauth::{AuthClient, CallbackListener, TerminalNavigator},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            eprintln!("❌ Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = match AuthClient::from_config(&config, Arc::new(TerminalNavigator)) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("❌ Failed to initialize: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Login { manual } => run_login(&config, &client, manual).await,
        Command::Status => run_status(&client),
        Command::Refresh => run_refresh(&client).await,
        Command::Token { kind } => run_token(&client, kind).await,
        Command::Me => run_me(&config, client).await,
        Command::CreateList { title, description } => {
            run_create_list(&config, client, &title, description.as_deref()).await
        }
        Command::Logout => run_logout(&client),
    }
}

/// Run the browser login round trip
async fn run_login(config: &Config, client: &AuthClient, manual: bool) -> ExitCode {
    // Bind before navigating so a fast redirect cannot beat the listener
    let listener = if manual {
        None
    } else {
        match CallbackListener::bind(&config.auth.redirect_uri).await {
            Ok(listener) => Some(listener),
            Err(e) => {
                eprintln!("❌ {e}");
                eprintln!("   Use --manual to paste the callback URL instead.");
                return ExitCode::FAILURE;
            }
        }
    };

    if let Err(e) = client.begin_login() {
        eprintln!("❌ Failed to start login: {e}");
        return ExitCode::FAILURE;
    }

    let callback_url = match listener {
        Some(listener) => {
            println!("Waiting for the browser to return to {} ...", config.auth.redirect_uri);
            listener.wait(config.session.callback_timeout).await
        }
        None => read_callback_url(),
    };

    let callback_url = match callback_url {
        Ok(url) => url,
        Err(e) => {
            client.abandon_login();
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    match client.complete_login(&callback_url).await {
        Ok(Some(tokens)) => {
            println!("✅ Logged in");
            if let Some(expires_at) = tokens.expires_at {
                println!("   Session valid until {}", format_epoch(expires_at));
            }
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("❌ Callback URL carried no authorization code");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("❌ Login failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn read_callback_url() -> collabtodo_auth::Result<String> {
    print!("Paste the URL your browser was redirected to: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Show session state
fn run_status(client: &AuthClient) -> ExitCode {
    let Some(tokens) = client.tokens() else {
        println!("❌ Not logged in");
        return ExitCode::FAILURE;
    };

    if client.is_authenticated() {
        println!("✅ Authenticated");
    } else {
        println!("⚠️  Session expired or about to expire");
    }

    if let Some(expires_at) = tokens.expires_at {
        println!("   Expires: {}", format_epoch(expires_at));
    }
    if let Some(remaining) = client.seconds_remaining() {
        println!("   Remaining: {remaining}s");
    }
    println!(
        "   Refresh token: {}",
        if tokens.refresh_token.is_some() { "present" } else { "absent" }
    );

    if client.is_authenticated() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Refresh if due
async fn run_refresh(client: &AuthClient) -> ExitCode {
    match client.ensure_fresh().await {
        Some(tokens) => {
            println!("✅ Session is fresh");
            if let Some(expires_at) = tokens.expires_at {
                println!("   Expires: {}", format_epoch(expires_at));
            }
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("❌ No usable session; run `collabtodo-auth login`");
            ExitCode::FAILURE
        }
    }
}

/// Print a token, refreshing first when due
async fn run_token(client: &AuthClient, kind: TokenKind) -> ExitCode {
    let token = match kind {
        TokenKind::Id => client.fresh_id_token().await,
        TokenKind::Access => client.fresh_access_token().await,
    };

    match token {
        Some(token) => {
            println!("{token}");
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("❌ No usable {kind:?} token; run `collabtodo-auth login`");
            ExitCode::FAILURE
        }
    }
}

/// Call `/v1/me`
async fn run_me(config: &Config, client: Arc<AuthClient>) -> ExitCode {
    let api = match ApiClient::new(&config.api, client) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    match api.me().await {
        Ok(me) => {
            println!("User:   {}", me.user_id);
            println!("Email:  {}", me.email);
            println!("Issuer: {}", me.issuer);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Create a list
async fn run_create_list(
    config: &Config,
    client: Arc<AuthClient>,
    title: &str,
    description: Option<&str>,
) -> ExitCode {
    let api = match ApiClient::new(&config.api, client) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    match api.create_list(title, description).await {
        Ok(list) => {
            match serde_json::to_string_pretty(&list) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{list}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// End the session
fn run_logout(client: &AuthClient) -> ExitCode {
    client.logout();
    println!("✅ Local session cleared");
    ExitCode::SUCCESS
}

fn format_epoch(epoch: i64) -> String {
    chrono::DateTime::from_timestamp(epoch, 0)
        .map_or_else(|| epoch.to_string(), |t| t.to_rfc3339())
}
