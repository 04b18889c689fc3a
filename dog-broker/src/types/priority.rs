use serde::{Deserialize, Serialize};

/// Job priority in `[1, 15]`. Higher values are served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct JobPriority(u8);

impl JobPriority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 15;

    pub const LOW: Self = Self(1);
    pub const NORMAL: Self = Self(5);
    pub const HIGH: Self = Self(10);
    pub const URGENT: Self = Self(15);

    /// Create from an exact value, `None` when outside `[1, 15]`
    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    /// Clamp any caller-supplied value into the valid range.
    ///
    /// Derived priorities such as `10 - estimated_seconds` can go negative;
    /// they land on [`JobPriority::LOW`] instead of being rejected.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(Self::MIN as i64, Self::MAX as i64) as u8)
    }

    /// Get the numeric value for ordering
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Human-readable label for the named levels
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("low"),
            5 => Some("normal"),
            10 => Some("high"),
            15 => Some("urgent"),
            _ => None,
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<JobPriority> for u8 {
    fn from(priority: JobPriority) -> Self {
        priority.0
    }
}

impl TryFrom<i64> for JobPriority {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("Priority {} outside [{}, {}]", value, Self::MIN, Self::MAX))
    }
}

impl std::fmt::Display for JobPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl std::str::FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::LOW),
            "normal" => Ok(Self::NORMAL),
            "high" => Ok(Self::HIGH),
            "urgent" => Ok(Self::URGENT),
            other => other
                .parse::<i64>()
                .map_err(|_| format!("Invalid priority: {}", s))
                .and_then(Self::try_from),
        }
    }
}
