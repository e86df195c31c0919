//! Relay command templating
//!
//! Templates are whitespace separated argument lists with `<url>`, `<proxy>` and
//! `<timeout>` placeholders. Substitution happens per argument so a link is
//! always passed to the process as a single argument.

use std::time::Duration;

use crate::errors::{RelayError, RelayResult};

pub const URL_PLACEHOLDER: &str = "<url>";
pub const PROXY_PLACEHOLDER: &str = "<proxy>";
pub const TIMEOUT_PLACEHOLDER: &str = "<timeout>";

/// Expand a template into an argument vector.
///
/// Without a proxy, the `<proxy>` argument is dropped together with the flag
/// preceding it (`-http_proxy <proxy>`). `<timeout>` is rendered in microseconds.
pub fn build_command(
    template: &str,
    url: &str,
    proxy: Option<&str>,
    timeout: Duration,
) -> RelayResult<Vec<String>> {
    let proxy = proxy.filter(|p| !p.is_empty());
    let timeout_us = timeout.as_micros().to_string();
    let mut args: Vec<String> = Vec::new();

    for token in template.split_whitespace() {
        if token.contains(PROXY_PLACEHOLDER) {
            match proxy {
                Some(proxy) => args.push(token.replace(PROXY_PLACEHOLDER, proxy)),
                None => {
                    if args.last().is_some_and(|flag| flag.starts_with('-')) {
                        args.pop();
                    }
                }
            }
            continue;
        }
        args.push(
            token
                .replace(URL_PLACEHOLDER, url)
                .replace(TIMEOUT_PLACEHOLDER, &timeout_us),
        );
    }

    if args.is_empty() {
        return Err(RelayError::EmptyCommand);
    }
    Ok(args)
}
