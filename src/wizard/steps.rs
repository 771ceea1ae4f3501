//! Wizard step sequence.

/// Steps of the rig setup wizard, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WizardStep {
    CameraIdentification,
    IntrinsicCalibration,
    ExtrinsicCalibration,
    DartboardRegistration,
    Verification,
    SaveLoad,
}

impl WizardStep {
    pub const ALL: [WizardStep; 6] = [
        WizardStep::CameraIdentification,
        WizardStep::IntrinsicCalibration,
        WizardStep::ExtrinsicCalibration,
        WizardStep::DartboardRegistration,
        WizardStep::Verification,
        WizardStep::SaveLoad,
    ];

    /// 1-based position shown to the user.
    pub fn number(&self) -> usize {
        match self {
            WizardStep::CameraIdentification => 1,
            WizardStep::IntrinsicCalibration => 2,
            WizardStep::ExtrinsicCalibration => 3,
            WizardStep::DartboardRegistration => 4,
            WizardStep::Verification => 5,
            WizardStep::SaveLoad => 6,
        }
    }

    pub fn from_number(number: usize) -> Option<Self> {
        number
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i))
            .copied()
    }

    pub fn title(&self) -> &'static str {
        match self {
            WizardStep::CameraIdentification => "Camera Identification",
            WizardStep::IntrinsicCalibration => "Intrinsic Calibration",
            WizardStep::ExtrinsicCalibration => "Extrinsic Calibration",
            WizardStep::DartboardRegistration => "Dartboard Registration",
            WizardStep::Verification => "Verification",
            WizardStep::SaveLoad => "Save/Load Profile",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            WizardStep::CameraIdentification => "Identify and label each camera in the rig",
            WizardStep::IntrinsicCalibration => "Calibrate each camera's lens with checkerboard captures",
            WizardStep::ExtrinsicCalibration => "Calibrate the stereo pair from simultaneous captures",
            WizardStep::DartboardRegistration => "Register the dartboard position",
            WizardStep::Verification => "Verify scoring accuracy",
            WizardStep::SaveLoad => "Save or load a calibration profile",
        }
    }

    pub fn next(&self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn previous(&self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    /// Steps that show live camera previews.
    pub fn uses_cameras(&self) -> bool {
        matches!(
            self,
            WizardStep::CameraIdentification
                | WizardStep::IntrinsicCalibration
                | WizardStep::ExtrinsicCalibration
        )
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Step {}: {}", self.number(), self.title())
    }
}

/// Camera slots a step needs bound.
///
/// The extrinsic step needs exactly its stereo pair; the other camera steps
/// need every available camera up to `max_slots`.
pub fn required_slots(
    step: WizardStep,
    available: usize,
    max_slots: usize,
    extrinsic_pair: [usize; 2],
) -> Vec<usize> {
    match step {
        WizardStep::ExtrinsicCalibration => extrinsic_pair.to_vec(),
        s if s.uses_cameras() => (0..available.min(max_slots)).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order() {
        let mut step = WizardStep::CameraIdentification;
        let mut seen = vec![step];
        while let Some(next) = step.next() {
            assert_eq!(next.previous(), Some(step));
            step = next;
            seen.push(step);
        }
        assert_eq!(seen, WizardStep::ALL.to_vec());
        assert_eq!(WizardStep::CameraIdentification.previous(), None);
        assert_eq!(WizardStep::SaveLoad.next(), None);
    }

    #[test]
    fn test_from_number() {
        assert_eq!(WizardStep::from_number(3), Some(WizardStep::ExtrinsicCalibration));
        assert_eq!(WizardStep::from_number(0), None);
        assert_eq!(WizardStep::from_number(7), None);
    }

    #[test]
    fn test_required_slots() {
        let pair = [0, 2];
        assert_eq!(
            required_slots(WizardStep::ExtrinsicCalibration, 3, 3, pair),
            vec![0, 2]
        );
        assert_eq!(
            required_slots(WizardStep::ExtrinsicCalibration, 1, 3, pair),
            vec![0, 2]
        );
        assert_eq!(
            required_slots(WizardStep::IntrinsicCalibration, 5, 3, pair),
            vec![0, 1, 2]
        );
        assert_eq!(
            required_slots(WizardStep::CameraIdentification, 2, 3, pair),
            vec![0, 1]
        );
        assert!(required_slots(WizardStep::Verification, 3, 3, pair).is_empty());
    }
}
