//! WhatsApp share link built when a plan is approved.

use regex::Regex;

/// Normalize a Brazilian phone number to digits with the country code.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let non_digits = Regex::new(r"\D").expect("static regex");
    let digits = non_digits.replace_all(phone, "").to_string();
    if digits.is_empty() {
        return None;
    }
    // Local numbers (DDD + number, up to 11 digits) get the 55 prefix.
    if digits.len() <= 11 {
        Some(format!("55{digits}"))
    } else {
        Some(digits)
    }
}

/// Build a wa.me link carrying the approval message, or `None` when the
/// establishment has no responsible phone on file.
pub fn build_share_link(
    phone: Option<&str>,
    responsible_name: Option<&str>,
    establishment_name: &str,
) -> Option<String> {
    let normalized = normalize_phone(phone?)?;
    let message = format!(
        "Olá {}, o Plano de Ação para {} foi aprovado e está disponível para verificação.",
        responsible_name.unwrap_or("Responsável"),
        establishment_name
    );
    Some(format!(
        "https://wa.me/{}?text={}",
        normalized,
        urlencoding::encode(&message)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_numbers_get_country_prefix() {
        assert_eq!(
            normalize_phone("(11) 98765-4321").as_deref(),
            Some("5511987654321")
        );
        assert_eq!(
            normalize_phone("5511987654321").as_deref(),
            Some("5511987654321")
        );
        assert_eq!(normalize_phone("  "), None);
    }

    #[test]
    fn link_encodes_message_and_uses_fallback_name() {
        let link = build_share_link(Some("11 98765-4321"), None, "Padaria Central").unwrap();
        assert!(link.starts_with("https://wa.me/5511987654321?text="));
        assert!(link.contains("Respons%C3%A1vel"));
        assert!(!link.contains(' '));
    }

    #[test]
    fn missing_phone_yields_no_link() {
        assert_eq!(build_share_link(None, Some("Ana"), "Padaria"), None);
    }
}
