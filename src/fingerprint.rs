use crate::models::{FingerprintKey, ManuscriptStatus};

/// Derive the comparison key for a status.
///
/// Every field participates. Counts contribute their textual form, so a
/// masked `2+**` never collides with an exact `2`.
pub fn fingerprint(status: &ManuscriptStatus) -> FingerprintKey {
    let digest = md5::compute(canonical_form(status).as_bytes());
    FingerprintKey::new(format!("{:x}", digest))
}

/// Fixed-order `key=value` lines. Values have embedded newlines escaped so
/// one field can never spill into the next.
fn canonical_form(status: &ManuscriptStatus) -> String {
    let mut out = String::new();
    for (field, value) in status.fields() {
        out.push_str(field.key());
        out.push('=');
        out.push_str(&value.replace('\\', "\\\\").replace('\n', "\\n"));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use crate::models::ReviewCount;
    use chrono::NaiveDate;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fixtures::status();

        // Same values, built in a different order
        let b = ManuscriptStatus {
            submitted_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            updated_date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            manuscript_number: "JCP-D-24-01234".to_string(),
            journal: "Journal of Computational Physics".to_string(),
            reviews_invited: ReviewCount::Exact(4),
            reviews_accepted: ReviewCount::AtLeast(2),
            reviews_completed: 2,
            progress_status: "Under Review".to_string(),
            title: "Adaptive mesh refinement for coupled flow problems".to_string(),
        };

        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).as_str().len(), 32);
    }

    #[test]
    fn test_masked_count_is_distinct() {
        let mut masked = fixtures::status();
        masked.reviews_invited = ReviewCount::AtLeast(2);
        let mut exact = fixtures::status();
        exact.reviews_invited = ReviewCount::Exact(2);

        assert_ne!(fingerprint(&masked), fingerprint(&exact));
    }

    #[test]
    fn test_every_field_participates() {
        let base = fixtures::status();
        let base_fp = fingerprint(&base);

        let mut variants = Vec::new();

        let mut s = base.clone();
        s.title.push('!');
        variants.push(s);

        let mut s = base.clone();
        s.progress_status = "Required Reviews Complete".to_string();
        variants.push(s);

        let mut s = base.clone();
        s.reviews_completed = 3;
        variants.push(s);

        let mut s = base.clone();
        s.reviews_accepted = ReviewCount::Exact(2);
        variants.push(s);

        let mut s = base.clone();
        s.reviews_invited = ReviewCount::Exact(5);
        variants.push(s);

        let mut s = base.clone();
        s.journal = "Computers & Fluids".to_string();
        variants.push(s);

        let mut s = base.clone();
        s.manuscript_number = "JCP-D-24-09999".to_string();
        variants.push(s);

        let mut s = base.clone();
        s.updated_date = NaiveDate::from_ymd_opt(2024, 5, 21).unwrap();
        variants.push(s);

        let mut s = base.clone();
        s.submitted_date = NaiveDate::from_ymd_opt(2024, 3, 6).unwrap();
        variants.push(s);

        for variant in &variants {
            assert_ne!(fingerprint(variant), base_fp, "{:?}", variant);
        }
    }

    #[test]
    fn test_field_boundaries_do_not_collide() {
        let mut a = fixtures::status();
        a.title = "A\nprogress_status=B".to_string();
        let mut b = fixtures::status();
        b.title = "A".to_string();

        assert_ne!(canonical_form(&a), canonical_form(&b));
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
