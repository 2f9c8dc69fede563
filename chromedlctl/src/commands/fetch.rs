use clap::Args;

/// Opens a page, clicks a download link and waits for the file.
#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    /// Page that exposes the download
    #[arg(short, long)]
    pub url: String,

    /// CSS selector of the element that triggers the download
    #[arg(short, long)]
    pub click: String,

    /// Types into a field before clicking, as SELECTOR=TEXT (repeatable)
    #[arg(long, value_parser = parse_fill)]
    pub fill: Vec<(String, String)>,

    /// Also retry page-load timeouts, not only missing or hidden elements
    #[arg(long)]
    pub retry_timeouts: bool,
}

/// Splits on the first `=` outside an attribute selector's brackets.
fn parse_fill(raw: &str) -> Result<(String, String), String> {
    let mut depth = 0usize;
    let split = raw.char_indices().find(|&(_, ch)| {
        match ch {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            '=' if depth == 0 => return true,
            _ => {}
        }
        false
    });
    match split {
        Some((index, _)) if !raw[..index].trim().is_empty() => Ok((
            raw[..index].trim().to_string(),
            raw[index + 1..].to_string(),
        )),
        _ => Err(format!("expected SELECTOR=TEXT, got `{raw}`")),
    }
}
