//! dB SPL <-> dB FS conversion
//!
//! A calibration signal of known nominal level is presented and read off the
//! SLM. The difference is the session offset, which then maps any desired SPL
//! to the digital level that should produce it at the microphone.

use crate::error::CalibrationError;

/// Offset between the nominal and measured level of a calibration signal
#[inline]
pub fn offset_from_reading(nominal_spl: f64, measured_spl: f64) -> f64 {
    nominal_spl - measured_spl
}

/// Digital presentation level for `desired_spl` given an established offset
#[inline]
pub fn level_for_target(desired_spl: f64, offset: f64) -> f64 {
    desired_spl + offset
}

/// State of one calibration-file procedure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationSession {
    /// Measured dB SPL of the reference channel, when known
    pub reference_level: Option<f64>,
    /// Nominal dB SPL of the calibration signal
    pub nominal_cal_spl: f64,
    pub last_measured_spl: Option<f64>,
    pub derived_offset: Option<f64>,
    pub derived_level_dbfs: Option<f64>,
}

impl CalibrationSession {
    pub fn new(nominal_cal_spl: f64) -> Self {
        Self {
            nominal_cal_spl,
            ..Default::default()
        }
    }

    /// Resume from an offset derived in an earlier session
    pub fn with_offset(nominal_cal_spl: f64, offset: f64) -> Self {
        Self {
            nominal_cal_spl,
            derived_offset: Some(offset),
            ..Default::default()
        }
    }

    pub fn record_reference(&mut self, level: f64) {
        self.reference_level = Some(level);
    }

    /// Store an SLM reading of the calibration signal and derive the offset
    pub fn record_reading(&mut self, measured_spl: f64) -> Result<f64, CalibrationError> {
        if !measured_spl.is_finite() {
            return Err(CalibrationError::InvalidReading(measured_spl));
        }
        let offset = offset_from_reading(self.nominal_cal_spl, measured_spl);
        self.last_measured_spl = Some(measured_spl);
        self.derived_offset = Some(offset);
        tracing::info!(
            "Calibration: nominal {:.1} dB SPL, measured {:.1} dB SPL -> offset {:+.2} dB",
            self.nominal_cal_spl,
            measured_spl,
            offset
        );
        Ok(offset)
    }

    /// Digital level that should produce `desired_spl`
    pub fn level_for(&mut self, desired_spl: f64) -> Result<f64, CalibrationError> {
        let offset = self.derived_offset.ok_or(CalibrationError::OffsetNotDerived)?;
        let level = level_for_target(desired_spl, offset);
        self.derived_level_dbfs = Some(level);
        Ok(level)
    }
}
