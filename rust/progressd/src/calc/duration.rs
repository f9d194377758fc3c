use crate::config::CalcConfig;

/// Nominal study hours rescaled for a student's deviation value against the
/// level's reference ability. A weaker student gets more hours, a stronger
/// one fewer; never negative.
pub fn true_duration(
    nominal_duration: f64,
    curriculum_level: &str,
    student_ability: Option<f64>,
    cfg: &CalcConfig,
) -> f64 {
    if !nominal_duration.is_finite() || nominal_duration <= 0.0 {
        return 0.0;
    }
    let Some(ability) = student_ability.filter(|v| v.is_finite()) else {
        return nominal_duration;
    };
    let reference = cfg.reference_ability(curriculum_level).unwrap_or(ability);
    let factor = 1.0 + cfg.ability_slope * (reference - ability);
    (nominal_duration * factor).max(0.0)
}
