//! Domain-generation-algorithm heuristics.
//!
//! Scores how plausible a label sequence is as human-chosen text, using a
//! bigram model over the most frequent letter pairs in English-like domain
//! names. Randomly generated labels hit far fewer common bigrams and score
//! low; data-exfiltration tunnels show up as very long sub-domain parts.

/// The most frequent bigrams of English text plus common domain-name pairs
/// (`oo`, `gl`, `tt`, ...). A bigram hit counts toward plausibility.
const COMMON_BIGRAMS: &[&str] = &[
    "th", "he", "in", "er", "an", "re", "on", "at", "en", "nd", "ti", "es", "or", "te", "of",
    "ed", "is", "it", "al", "ar", "st", "to", "nt", "ng", "se", "ha", "as", "ou", "io", "le",
    "ve", "co", "me", "de", "hi", "ri", "ro", "ic", "ne", "ea", "ra", "ce", "li", "ch", "ll",
    "be", "ma", "si", "om", "ur", "ca", "el", "ta", "la", "ns", "di", "fo", "ho", "pe", "ec",
    "pr", "no", "ct", "us", "ac", "ot", "il", "tr", "ly", "nc", "et", "ut", "ss", "so", "rs",
    "un", "lo", "wa", "ge", "ie", "wh", "ee", "wi", "em", "ad", "ol", "rt", "po", "we", "na",
    "ul", "ni", "ts", "mo", "ow", "pa", "im", "mi", "ai", "sh", "ir", "su", "id", "os", "iv",
    "ia", "am", "fi", "ci", "vi", "pl", "ig", "tu", "ev", "ld", "ry", "mp", "fe", "bl", "ab",
    "gh", "ty", "op", "sa", "ay", "ex", "ke", "ui", "pt", "do", "oo", "gl", "tt", "rr",
    "ap", "go", "bo", "bu", "fa", "ga", "gi", "gu", "gr", "ba", "by", "bi", "da", "du", "dr",
    "ck", "ub", "od", "ef", "eg", "ep", "eb", "ff", "ys", "ws", "ds", "ms", "ks", "ps", "ix",
];

fn is_common_bigram(a: u8, b: u8) -> bool {
    let pair = [a, b];
    COMMON_BIGRAMS
        .iter()
        .any(|bg| bg.as_bytes() == pair)
}

/// Plausibility score of one label sequence (dots are segment breaks and
/// excluded from pairs). 20 means every bigram is common; random strings
/// land well below 5.
pub fn plausibility_score(text: &str) -> f64 {
    let lowered = text.to_ascii_lowercase();
    let mut total = 0u32;
    let mut hits = 0u32;

    for segment in lowered.split(['.', '-', '_']) {
        let bytes = segment.as_bytes();
        for pair in bytes.windows(2) {
            total += 1;
            // Digits never count as plausible pairs.
            if pair[0].is_ascii_alphabetic()
                && pair[1].is_ascii_alphabetic()
                && is_common_bigram(pair[0], pair[1])
            {
                hits += 1;
            }
        }
    }

    if total == 0 {
        // Nothing to judge; short labels pass.
        return 20.0;
    }
    20.0 * f64::from(hits) / f64::from(total)
}

/// Labels this short carry too little signal to judge and always pass.
pub const MIN_SCORED_LABEL_LEN: usize = 7;

/// Worst per-label plausibility of a label sequence. Labels shorter than
/// [`MIN_SCORED_LABEL_LEN`] are skipped; an empty or all-short sequence
/// passes with the maximum score.
pub fn worst_label_score<'a>(labels: impl Iterator<Item = &'a str>) -> f64 {
    labels
        .filter(|l| l.len() >= MIN_SCORED_LABEL_LEN)
        .map(plausibility_score)
        .fold(20.0, f64::min)
}

/// Default threshold below which a domain is treated as a possible DGA.
pub const DGA_THRESHOLD: f64 = 5.0;

/// Secondary threshold applied to oversized sub-domain parts (exfiltration
/// tunnels often encode data that still contains some common pairs).
pub const TUNNEL_THRESHOLD: f64 = 10.0;

/// Length excess over the eTLD+1 at which the sub-domain part is checked.
pub const TUNNEL_LENGTH_EXCESS: usize = 100;
