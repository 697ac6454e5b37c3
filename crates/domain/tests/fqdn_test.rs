use vigil_domain::fqdn;

#[test]
fn test_normalize() {
    assert_eq!(fqdn::normalize("Example.COM"), "example.com.");
    assert_eq!(fqdn::normalize("example.com."), "example.com.");
    assert_eq!(fqdn::normalize("  example.com "), "example.com.");
}

#[test]
fn test_is_valid() {
    assert!(fqdn::is_valid("example.com"));
    assert!(fqdn::is_valid("example.com."));
    assert!(fqdn::is_valid("sub-1.example.com"));
    assert!(fqdn::is_valid("_dmarc.example.com"));
    assert!(!fqdn::is_valid(""));
    assert!(!fqdn::is_valid("exa mple.com"));
    assert!(!fqdn::is_valid("ex!ample.com"));
    assert!(!fqdn::is_valid(&"a".repeat(300)));
}

#[test]
fn test_etld_plus_one() {
    assert_eq!(
        fqdn::etld_plus_one("foo.bar.example.co.uk.").as_deref(),
        Some("example.co.uk.")
    );
    assert_eq!(
        fqdn::etld_plus_one("www.example.com.").as_deref(),
        Some("example.com.")
    );
    assert_eq!(
        fqdn::etld_plus_one("example.com.").as_deref(),
        Some("example.com.")
    );
    assert_eq!(fqdn::etld_plus_one("com."), None);
}

#[test]
fn test_subdomain_of() {
    assert_eq!(
        fqdn::subdomain_of("foo.bar.example.co.uk.").as_deref(),
        Some("foo.bar")
    );
    assert_eq!(fqdn::subdomain_of("example.com."), None);
}

#[test]
fn test_sub_domain_expansion() {
    // Shortest first, trailing dot preserved.
    assert_eq!(
        fqdn::sub_domains("foo.bar.example.co.uk."),
        vec![
            "example.co.uk.".to_string(),
            "bar.example.co.uk.".to_string(),
            "foo.bar.example.co.uk.".to_string(),
        ]
    );
    assert_eq!(
        fqdn::sub_domains("www.example.com."),
        vec!["example.com.".to_string(), "www.example.com.".to_string()]
    );
    assert_eq!(
        fqdn::sub_domains("example.com."),
        vec!["example.com.".to_string()]
    );
}
