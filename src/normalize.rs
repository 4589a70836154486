// 🔤 Name Normalization
// Two different transformations live here and must not be confused:
// - normalize_name: comparison key (keeps accents)
// - to_identifier: snake_case identifier construction (folds accents)

/// Normalize a commune name into a comparison key
///
/// - Trim surrounding whitespace
/// - Lowercase
/// - Hyphens become spaces
/// - Runs of whitespace collapse to a single space
///
/// Accents are kept: "Pétange" and "Petange" are different keys.
///
/// Example: "  Esch-sur-Alzette " → "esch sur alzette"
pub fn normalize_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Fold a single lowercase character to its ASCII form
///
/// Returns None for characters that are dropped entirely.
fn fold_char(c: char) -> Option<char> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' => 'i',
        'ô' | 'ö' => 'o',
        'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        '-' | ' ' | '/' => '_',
        '\'' | '’' => return None,
        other => other,
    };
    Some(folded)
}

/// Build a snake_case identifier directly from a raw name
///
/// Used only for sources with no curated alias table.
///
/// Examples:
/// - "Käerjeng" → "kaerjeng"
/// - "Redange/Attert" → "redange_attert"
/// - "Vallée de l'Ernz" → "vallee_de_lernz"
pub fn to_identifier(raw: &str) -> String {
    let mut id = String::with_capacity(raw.len());

    for c in raw.trim().to_lowercase().chars() {
        let Some(folded) = fold_char(c) else {
            continue;
        };
        // "Colmar - Berg" would otherwise give "colmar___berg"
        if folded == '_' && id.ends_with('_') {
            continue;
        }
        id.push(folded);
    }

    id.trim_matches('_').to_string()
}

/// True for ids usable as record file names: non-empty `[a-z0-9_]`
pub fn is_identifier(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name_case_and_hyphens() {
        assert_eq!(normalize_name("Esch-sur-Alzette"), "esch sur alzette");
        assert_eq!(normalize_name("esch sur alzette"), "esch sur alzette");
        assert_eq!(normalize_name("ESCH-SUR-ALZETTE"), "esch sur alzette");
    }

    #[test]
    fn test_normalize_name_whitespace() {
        assert_eq!(normalize_name("  Colmar - Berg  "), "colmar berg");
        assert_eq!(normalize_name("Parc\tHosingen"), "parc hosingen");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn test_normalize_name_keeps_accents() {
        assert_eq!(normalize_name("Pétange"), "pétange");
        assert_ne!(normalize_name("Pétange"), normalize_name("Petange"));
    }

    #[test]
    fn test_to_identifier() {
        assert_eq!(to_identifier("Esch-sur-Alzette"), "esch_sur_alzette");
        assert_eq!(to_identifier("Käerjeng"), "kaerjeng");
        assert_eq!(to_identifier("Pétange"), "petange");
        assert_eq!(to_identifier("Erpeldange-sur-Sûre"), "erpeldange_sur_sure");
        assert_eq!(to_identifier("Redange/Attert"), "redange_attert");
        assert_eq!(to_identifier("Vallée de l'Ernz"), "vallee_de_lernz");
        assert_eq!(to_identifier("Colmar - Berg"), "colmar_berg");
        assert_eq!(to_identifier(" Mondorf-les-Bains "), "mondorf_les_bains");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("esch_sur_alzette"));
        assert!(is_identifier("mamer"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("redange_(attert)"));
        assert!(!is_identifier(&to_identifier("Redange (Attert)")));
        assert!(!is_identifier("Mamer"));
    }
}
