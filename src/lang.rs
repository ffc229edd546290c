//! Source-language detection via whatlang.
//! Used to skip dispatch when the source text already reads as the target
//! language; provider-declared detection takes precedence when available.

/// Detect the dominant language of `text` as an ISO 639-1 code.
/// Returns None when detection is unreliable (short or mixed text).
pub fn detect(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    if !info.is_reliable() {
        return None;
    }
    Some(iso_code(info.lang()).to_string())
}

/// True when `text` reliably detects as `lang`.
pub fn matches(text: &str, lang: &str) -> bool {
    detect(text).as_deref() == Some(lang)
}

fn iso_code(lang: whatlang::Lang) -> &'static str {
    use whatlang::Lang::*;
    match lang {
        Eng => "en",
        Cmn => "zh",
        Jpn => "ja",
        Kor => "ko",
        Fra => "fr",
        Deu => "de",
        Spa => "es",
        Rus => "ru",
        Por => "pt",
        Ita => "it",
        Ara => "ar",
        Hin => "hi",
        Tur => "tr",
        Vie => "vi",
        Nld => "nl",
        Pol => "pl",
        Ukr => "uk",
        Swe => "sv",
        Dan => "da",
        Fin => "fi",
        _ => "other",
    }
}
