//! `lapse inspect`.

use std::time::Duration;

use chrono::Utc;

use crate::auth::claims;

/// Handle `lapse inspect <TOKEN>`.
pub fn handle_inspect(token: &str, buffer_secs: u64) -> Result<(), Box<dyn std::error::Error>> {
    let decoded = claims::decode(token)?;
    let now = Utc::now();
    let buffer = Duration::from_secs(buffer_secs);

    println!("Subject:        {}", decoded.subject.as_deref().unwrap_or("-"));
    match decoded.expires_at_utc() {
        Some(at) => println!("Expires at:     {}", at.to_rfc3339()),
        None => println!("Expires at:     {} (out of range)", decoded.expires_at),
    }
    println!(
        "Until expiry:   {:.3}s",
        decoded.time_until_expiry(now).num_milliseconds() as f64 / 1000.0
    );
    println!(
        "Until refresh:  {:.3}s",
        decoded.time_until_refresh(now, buffer).as_secs_f64()
    );
    println!("Expired:        {}", decoded.is_expired(now));
    Ok(())
}
