//! Builds the SoC-over-time-while-charging table for a (vehicle type,
//! charging type) pair, and answers "how much SoC would `Δt` minutes of
//! charging add starting from `soc0`" queries against it.

use crate::domain::ChargingCurve;

/// Strictly increasing (time_minutes, soc) samples, starting at (0, 0) and
/// ending at (t_full, 1.0).
#[derive(Debug, Clone)]
pub struct SocTimeTable(pub Vec<(f64, f64)>);

#[derive(Debug, Clone, Copy)]
pub struct CurveParams {
    pub capacity_kwh: f64,
    pub grid_cap_kw: f64,
    pub efficiency: f64,
    pub step_min: f64,
}

impl SocTimeTable {
    /// Forward Euler-trapezoidal integration of the charging curve.
    ///
    /// At each step, instantaneous power is linearly interpolated at the
    /// current soc and at a tentative next soc; the mean of the two,
    /// scaled by efficiency and capped at `grid_cap_kw`, advances soc by
    /// `(step_min/60) * power_kw / capacity_kwh`.
    pub fn build(curve: &ChargingCurve, params: CurveParams) -> Self {
        let mut table = vec![(0.0, 0.0)];
        let mut t = 0.0f64;
        let mut s = 0.0f64;
        let step_h = params.step_min / 60.0;

        while s < 1.0 {
            let p_now = curve.power_at(s).min(params.grid_cap_kw);
            let tentative_s = (s + step_h * p_now / params.capacity_kwh).min(1.0);
            let p_next = curve.power_at(tentative_s).min(params.grid_cap_kw);
            let p_mean = (p_now + p_next) / 2.0 * params.efficiency;

            let ds = step_h * p_mean / params.capacity_kwh;
            if ds <= 0.0 {
                // Degenerate curve (e.g. zero power) — stop rather than loop forever.
                break;
            }
            s = (s + ds).min(1.0);
            t += params.step_min;
            table.push((t, s));
        }

        if table.last().map(|(_, soc)| *soc < 1.0).unwrap_or(true) {
            table.push((t, 1.0));
        }

        Self(table)
    }

    /// Time of the first sample whose soc is ≥ `max(soc0, 0)`.
    fn time_at_or_above(&self, soc0: f64) -> f64 {
        let floor = soc0.max(0.0);
        self.0
            .iter()
            .find(|(_, soc)| *soc >= floor)
            .map(|(t, _)| *t)
            .unwrap_or_else(|| self.0.last().map(|(t, _)| *t).unwrap_or(0.0))
    }

    /// SoC at `t`, clamped to the table's last row (1.0) beyond its range.
    fn soc_at_time(&self, t: f64) -> f64 {
        if t <= self.0[0].0 {
            return self.0[0].1;
        }
        let last = self.0[self.0.len() - 1];
        if t >= last.0 {
            return last.1;
        }
        for window in self.0.windows(2) {
            let (t0, s0) = window[0];
            let (t1, s1) = window[1];
            if t >= t0 && t <= t1 {
                if (t1 - t0).abs() < f64::EPSILON {
                    return s1;
                }
                let frac = (t - t0) / (t1 - t0);
                return s0 + frac * (s1 - s0);
            }
        }
        last.1
    }

    /// SoC gained charging for `dt_min` minutes starting from `soc0`.
    pub fn delta_soc(&self, soc0: f64, dt_min: f64) -> f64 {
        if dt_min == 0.0 {
            return 0.0;
        }
        let t0 = self.time_at_or_above(soc0);
        let soc_at = self.soc_at_time(t0 + dt_min);
        (soc_at - soc0).min(1.0).max(0.0)
    }
}
