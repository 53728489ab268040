use smol_str::SmolStr;

/// Pricing class of an instrument, used to derive its pip size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentClass {
    /// Standard currency pair quoted to 4 decimal places (e.g. EURUSD).
    Standard,
    /// JPY-quoted cross quoted to 2 decimal places (e.g. USDJPY).
    JpyCross,
    /// Spot metal priced like XAU/XAG.
    Metal,
}

impl InstrumentClass {
    /// Classify a normalised instrument code.
    pub fn of(code: &str) -> Self {
        if code.contains("JPY") {
            InstrumentClass::JpyCross
        } else if code.starts_with("XAU") || code.starts_with("XAG") {
            InstrumentClass::Metal
        } else {
            InstrumentClass::Standard
        }
    }

    /// Size of one pip for this class.
    pub fn pip_size(&self) -> f64 {
        match self {
            InstrumentClass::Standard => 0.0001,
            InstrumentClass::JpyCross | InstrumentClass::Metal => 0.01,
        }
    }
}

/// Normalise a raw upstream ticker into the canonical uppercase code.
///
/// Upstream feeds publish lowercase tickers ("eurusd"); clients may send
/// either case or a slash-separated pair ("EUR/USD").
pub fn normalise(raw: &str) -> SmolStr {
    let mut code = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        if c != '/' && c != '-' {
            code.extend(c.to_uppercase());
        }
    }
    SmolStr::from(code)
}

/// Pip size for a normalised instrument code.
pub fn pip_size(code: &str) -> f64 {
    InstrumentClass::of(code).pip_size()
}
