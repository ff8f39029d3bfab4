use crate::{config::DescriptionConfig, model::WeatherRecord};

/// Render a text prompt for `record`, e.g.
/// "A photo of the sky. Weather: Light snow. Temperature: -3.5 °C."
///
/// Columns that are absent or blank are left out.
pub fn describe(record: &WeatherRecord, config: &DescriptionConfig) -> String {
    let mut text = config.prefix.trim().trim_end_matches('.').to_string();

    for col in &config.columns {
        let Some(value) = record.get(&col.column).filter(|v| !v.is_empty()) else {
            continue;
        };

        if !text.is_empty() {
            text.push_str(". ");
        }
        text.push_str(&col.label);
        text.push_str(": ");
        text.push_str(value.trim_end_matches('.'));
        text.push_str(&col.suffix);
    }

    if !text.is_empty() {
        text.push('.');
    }

    text
}
