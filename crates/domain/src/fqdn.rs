//! Fully-qualified domain name helpers: normalisation, public-suffix
//! splitting, and sub-domain expansion for list lookups.

/// Multi-label public suffixes the splitter recognises in addition to the
/// generic single-label TLD rule. Compact subset of the public suffix list
/// covering the registries seen in practice on end-user devices.
const MULTI_LABEL_SUFFIXES: &[&str] = &[
    "co.uk", "org.uk", "me.uk", "net.uk", "ac.uk", "gov.uk", "ltd.uk", "plc.uk", "sch.uk",
    "com.au", "net.au", "org.au", "edu.au", "gov.au", "id.au", "asn.au",
    "co.nz", "net.nz", "org.nz", "govt.nz", "ac.nz",
    "co.jp", "ne.jp", "or.jp", "ac.jp", "go.jp",
    "com.br", "net.br", "org.br", "gov.br",
    "co.za", "org.za", "net.za", "gov.za", "ac.za",
    "co.in", "net.in", "org.in", "gen.in", "ac.in", "gov.in",
    "com.cn", "net.cn", "org.cn", "gov.cn", "edu.cn",
    "com.tw", "org.tw", "net.tw",
    "com.hk", "org.hk", "net.hk",
    "com.sg", "org.sg", "net.sg",
    "com.mx", "org.mx", "net.mx",
    "com.ar", "net.ar", "org.ar",
    "co.kr", "or.kr", "ne.kr", "go.kr", "ac.kr",
    "com.tr", "net.tr", "org.tr",
    "co.il", "org.il", "net.il", "ac.il",
    "com.ua", "net.ua", "org.ua",
    "com.pl", "net.pl", "org.pl",
    "com.ru", "net.ru", "org.ru",
];

/// Lowercase and ensure a trailing dot.
pub fn normalize(domain: &str) -> String {
    let mut d = domain.trim().to_ascii_lowercase();
    if !d.ends_with('.') {
        d.push('.');
    }
    d
}

/// Basic label-syntax validity: non-empty labels of `[a-z0-9_-]`, each at
/// most 63 bytes, total at most 255.
pub fn is_valid(domain: &str) -> bool {
    let d = domain.strip_suffix('.').unwrap_or(domain);
    if d.is_empty() || d.len() > 255 {
        return false;
    }
    d.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && label
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    })
}

/// Split `domain` into (labels before the public suffix, public suffix).
/// Returns `None` when the domain is the public suffix itself or shorter.
fn split_public_suffix(domain: &str) -> Option<(Vec<&str>, String)> {
    let d = domain.strip_suffix('.').unwrap_or(domain);
    let labels: Vec<&str> = d.split('.').collect();
    if labels.len() < 2 {
        return None;
    }

    // Longest multi-label suffix wins over the generic TLD rule.
    for suffix in MULTI_LABEL_SUFFIXES {
        let suffix_len = suffix.split('.').count();
        if labels.len() > suffix_len && d.ends_with(suffix) {
            let head = labels[..labels.len() - suffix_len].to_vec();
            return Some((head, (*suffix).to_string()));
        }
    }

    let (head, tld) = labels.split_at(labels.len() - 1);
    Some((head.to_vec(), tld[0].to_string()))
}

/// Effective TLD plus one label: `foo.bar.example.co.uk.` → `example.co.uk.`
pub fn etld_plus_one(domain: &str) -> Option<String> {
    let (head, suffix) = split_public_suffix(domain)?;
    let last = head.last()?;
    Some(format!("{last}.{suffix}."))
}

/// The part of `domain` in front of the eTLD+1, without trailing dot:
/// `foo.bar.example.co.uk.` → `foo.bar`.
pub fn subdomain_of(domain: &str) -> Option<String> {
    let (head, _) = split_public_suffix(domain)?;
    if head.len() < 2 {
        return None;
    }
    Some(head[..head.len() - 1].join("."))
}

/// Sub-domain expansion for list lookups: strip the public suffix, then
/// emit every suffix of the remaining labels joined back with the public
/// suffix, shortest first, preserving the trailing dot.
///
/// `foo.bar.example.co.uk.` → `[example.co.uk., bar.example.co.uk.,
/// foo.bar.example.co.uk.]`
pub fn sub_domains(domain: &str) -> Vec<String> {
    let Some((head, suffix)) = split_public_suffix(domain) else {
        return vec![normalize(domain)];
    };
    let mut out = Vec::with_capacity(head.len());
    for i in (0..head.len()).rev() {
        out.push(format!("{}.{suffix}.", head[i..].join(".")));
    }
    out
}
