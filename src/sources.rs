use crate::config::Config;

/// One row per configured source.
pub fn format_sources(config: &Config) -> String {
    let mut out = format!(
        "{:<16} {:<10} {:<10} LISTING\n",
        "SOURCE", "SHAPE", "OVERRIDES"
    );
    for (name, source) in &config.sources {
        out.push_str(&format!(
            "{:<16} {:<10} {:<10} {}\n",
            name,
            source.shape.as_str(),
            source.overrides.len(),
            source.listing_url
        ));
    }
    out
}

pub fn list_sources(config: &Config) {
    print!("{}", format_sources(config));
}
