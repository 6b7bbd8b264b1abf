use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::{Asia::Tokyo, Tz};

/// Pharmacy business timezone
pub const BUSINESS_TZ: Tz = Tokyo;

/// Get current time in the business timezone
pub fn tokyo_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&BUSINESS_TZ)
}

/// Calendar date used to select "today's" movements
pub fn business_date_today() -> NaiveDate {
    tokyo_now().date_naive()
}

/// Get current time in the business timezone as RFC3339 string
pub fn tokyo_now_rfc3339() -> String {
    tokyo_now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Offset;

    #[test]
    fn test_tokyo_timezone() {
        let tokyo_time = tokyo_now();

        // Tokyo has no DST and sits 9 hours ahead of UTC
        let diff = tokyo_time.offset().fix().local_minus_utc();
        assert_eq!(diff, 9 * 3600);
    }

    #[test]
    fn test_rfc3339_format() {
        let rfc3339_string = tokyo_now_rfc3339();
        assert!(rfc3339_string.contains("+09:00"));
    }

    #[test]
    fn test_business_date_matches_tokyo_clock() {
        let before = tokyo_now().date_naive();
        let today = business_date_today();
        let after = tokyo_now().date_naive();
        assert!(today == before || today == after);
    }
}
