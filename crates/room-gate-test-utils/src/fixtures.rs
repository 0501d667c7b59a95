//! Fixtures for gate tests.

use reqwest::header::SET_COOKIE;
use room_gate::middleware::CREDENTIAL_COOKIE;

/// A desktop browser user agent.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

/// Link-preview and crawler user agents seen in the wild.
pub const BOT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)",
    "facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)",
    "Slackbot-LinkExpanding 1.0 (+https://api.slack.com/robots)",
    "Twitterbot/1.0",
    "Mozilla/5.0 (compatible; Discordbot/2.0; +https://discordapp.com)",
    "WhatsApp/2.23.20.0",
    "TelegramBot (like TwitterBot)",
    "LinkedInBot/1.0 (compatible; Mozilla/5.0; Apache-HttpClient +http://www.linkedin.com)",
    "Mozilla/5.0 (compatible; AhrefsBot/7.0; +http://ahrefs.com/robot/)",
];

/// HTTP client that reports redirects instead of following them.
pub fn gate_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("Failed to build test HTTP client")
}

/// `Cookie` header value presenting `token` as the credential.
pub fn credential_cookie_header(token: &str) -> String {
    format!("{CREDENTIAL_COOKIE}={token}")
}

/// Credential issued by a response, if it set one.
pub fn credential_from(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| {
            let first = cookie.split(';').next()?;
            let (name, value) = first.split_once('=')?;
            (name.trim() == CREDENTIAL_COOKIE).then(|| value.trim().to_string())
        })
}

/// `Location` header of a redirect response.
pub fn redirect_location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
