use serde::Serialize;

use crate::models::HealthMetric;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BloodPressure {
    pub systolic: i64,
    pub diastolic: i64,
}

/// Averages over a patient's metric history. A field with no readings is
/// absent rather than zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSummary {
    pub readings: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_heart_rate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_blood_pressure: Option<BloodPressure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_blood_sugar: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_temperature: Option<f64>,
}

#[derive(Default)]
struct Mean {
    total: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.total += value;
        self.count += 1;
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total / self.count as f64)
    }
}

impl HealthSummary {
    pub fn from_metrics(metrics: &[HealthMetric]) -> Self {
        let mut heart_rate = Mean::default();
        let mut systolic = Mean::default();
        let mut diastolic = Mean::default();
        let mut blood_sugar = Mean::default();
        let mut temperature = Mean::default();

        for metric in metrics {
            if let Some(hr) = metric.heart_rate {
                heart_rate.add(hr);
            }
            // Pressure only counts as a pair.
            if let (Some(sys), Some(dia)) = (metric.systolic, metric.diastolic) {
                systolic.add(sys);
                diastolic.add(dia);
            }
            if let Some(sugar) = metric.blood_sugar {
                blood_sugar.add(sugar);
            }
            if let Some(temp) = metric.temperature {
                temperature.add(temp);
            }
        }

        HealthSummary {
            readings: metrics.len(),
            average_heart_rate: heart_rate.value().map(round_whole),
            average_blood_pressure: systolic.value().zip(diastolic.value()).map(|(s, d)| BloodPressure {
                systolic: round_whole(s),
                diastolic: round_whole(d),
            }),
            average_blood_sugar: blood_sugar.value().map(round_whole),
            average_temperature: temperature.value().map(|t| (t * 10.0).round() / 10.0),
        }
    }
}

fn round_whole(value: f64) -> i64 {
    value.round() as i64
}
