//! Waveform channel -> device output routing

use std::fmt;

use crate::error::AudioError;

/// 1-based output channel per waveform channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSpec(Vec<i64>);

impl RoutingSpec {
    pub fn new(channels: Vec<i64>) -> Self {
        Self(channels)
    }

    /// Parse space-separated channel numbers, e.g. `"1 2"`
    pub fn parse(text: &str) -> Result<Self, AudioError> {
        let channels = text
            .split_whitespace()
            .map(|token| {
                token
                    .parse::<i64>()
                    .map_err(|_| AudioError::InvalidRouting(format!("'{}' is not a channel number", token)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if channels.is_empty() {
            return Err(AudioError::InvalidRouting("routing is empty".to_string()));
        }
        Ok(Self(channels))
    }

    /// Route a mono signal to one zero-based speaker channel
    pub fn single(speaker_channel: u16) -> Self {
        Self(vec![i64::from(speaker_channel) + 1])
    }

    pub fn channels(&self) -> &[i64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Zero-based output indices; only meaningful after [`validate`]
    pub(crate) fn output_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().map(|&ch| (ch - 1) as usize)
    }
}

impl fmt::Display for RoutingSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|ch| ch.to_string()).collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Check a routing against the loaded waveform and the target device
///
/// One entry per waveform channel, each within `1..=device_channel_capacity`,
/// no output used twice. The routing is returned untouched.
pub fn validate(
    routing: &RoutingSpec,
    channel_count: u16,
    device_channel_capacity: u16,
) -> Result<RoutingSpec, AudioError> {
    if routing.len() != channel_count as usize {
        return Err(AudioError::InvalidRouting(format!(
            "{} routing entries for a {}-channel waveform",
            routing.len(),
            channel_count
        )));
    }

    let mut seen = Vec::with_capacity(routing.len());
    for &ch in routing.channels() {
        if ch < 1 || ch > i64::from(device_channel_capacity) {
            return Err(AudioError::InvalidRouting(format!(
                "channel {} outside 1..={} of the device",
                ch, device_channel_capacity
            )));
        }
        if seen.contains(&ch) {
            return Err(AudioError::InvalidRouting(format!("channel {} routed twice", ch)));
        }
        seen.push(ch);
    }

    Ok(routing.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch() {
        let routing = RoutingSpec::new(vec![1, 2]);
        assert!(matches!(
            validate(&routing, 1, 8),
            Err(AudioError::InvalidRouting(_))
        ));
    }

    #[test]
    fn test_capacity_and_sign() {
        assert!(validate(&RoutingSpec::new(vec![9]), 1, 8).is_err());
        assert!(validate(&RoutingSpec::new(vec![0]), 1, 8).is_err());
        assert!(validate(&RoutingSpec::new(vec![-3]), 1, 8).is_err());
        assert!(validate(&RoutingSpec::new(vec![8]), 1, 8).is_ok());
    }

    #[test]
    fn test_duplicate_outputs() {
        assert!(validate(&RoutingSpec::new(vec![2, 2]), 2, 8).is_err());
    }

    #[test]
    fn test_returns_routing_unchanged() {
        let routing = RoutingSpec::new(vec![4, 1, 3]);
        assert_eq!(validate(&routing, 3, 4).unwrap(), routing);
    }

    #[test]
    fn test_parse() {
        assert_eq!(RoutingSpec::parse(" 1  3 ").unwrap().channels(), &[1, 3]);
        assert_eq!(RoutingSpec::parse("0 -2").unwrap().channels(), &[0, -2]);
        assert!(RoutingSpec::parse("1 two").is_err());
        assert!(RoutingSpec::parse("   ").is_err());
        assert_eq!(RoutingSpec::single(2).to_string(), "3");
    }
}
