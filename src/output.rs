use std::sync::OnceLock;

static QUIET: OnceLock<bool> = OnceLock::new();

/// `PACKTRACK_QUIET=1` silences the decorative terminal output
pub fn is_quiet() -> bool {
    *QUIET.get_or_init(|| {
        std::env::var("PACKTRACK_QUIET")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    })
}
