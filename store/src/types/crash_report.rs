//! Traffic crash report, the record type of the source dataset.

use crate::storage::{CodecError, Record, RecordReader, RecordWriter};

/// One traffic crash report.
///
/// Field order here is the on-disk field order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CrashReport {
    /// Record id. Assigned by the store on insert.
    pub id: i32,
    /// Crash timestamp as it appeared in the source data.
    pub crash_date: String,
    /// Calendar day of the crash, in days since 1970-01-01.
    pub epoch_day: i64,
    pub traffic_control_device: String,
    pub weather_condition: String,
    pub lighting_condition: Vec<String>,
    pub first_crash_type: String,
    pub trafficway_type: String,
    pub alignment: String,
    pub roadway_surface_cond: String,
    pub road_defect: String,
    pub crash_type: Vec<String>,
    pub intersection_related: bool,
    /// Damage band, e.g. `"$500 OR LESS"`.
    pub damage: String,
    pub prim_contributory_cause: String,
    pub num_units: i32,
    pub most_severe_injury: Vec<String>,
    pub injuries: Injuries,
    pub crash_hour: i32,
    /// 1 = Monday .. 7 = Sunday.
    pub crash_day_of_week: i32,
    pub crash_month: i32,
}

/// Injury counters of a crash report.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Injuries {
    pub total: f32,
    pub fatal: f32,
    pub incapacitating: f32,
    pub non_incapacitating: f32,
    pub reported_not_evident: f32,
    pub no_indication: f32,
}

impl Record for CrashReport {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = RecordWriter::new();
        w.put_i32(self.id);
        w.put_str(&self.crash_date)?;
        w.put_i64(self.epoch_day);
        w.put_str(&self.traffic_control_device)?;
        w.put_str(&self.weather_condition)?;
        w.put_str_list(&self.lighting_condition)?;
        w.put_str(&self.first_crash_type)?;
        w.put_str(&self.trafficway_type)?;
        w.put_str(&self.alignment)?;
        w.put_str(&self.roadway_surface_cond)?;
        w.put_str(&self.road_defect)?;
        w.put_str_list(&self.crash_type)?;
        w.put_bool(self.intersection_related);
        w.put_str(&self.damage)?;
        w.put_str(&self.prim_contributory_cause)?;
        w.put_i32(self.num_units);
        w.put_str_list(&self.most_severe_injury)?;
        w.put_f32(self.injuries.total);
        w.put_f32(self.injuries.fatal);
        w.put_f32(self.injuries.incapacitating);
        w.put_f32(self.injuries.non_incapacitating);
        w.put_f32(self.injuries.reported_not_evident);
        w.put_f32(self.injuries.no_indication);
        w.put_i32(self.crash_hour);
        w.put_i32(self.crash_day_of_week);
        w.put_i32(self.crash_month);
        Ok(w.finish())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = RecordReader::new(bytes);
        Ok(Self {
            id: r.get_i32()?,
            crash_date: r.get_str()?,
            epoch_day: r.get_i64()?,
            traffic_control_device: r.get_str()?,
            weather_condition: r.get_str()?,
            lighting_condition: r.get_str_list()?,
            first_crash_type: r.get_str()?,
            trafficway_type: r.get_str()?,
            alignment: r.get_str()?,
            roadway_surface_cond: r.get_str()?,
            road_defect: r.get_str()?,
            crash_type: r.get_str_list()?,
            intersection_related: r.get_bool()?,
            damage: r.get_str()?,
            prim_contributory_cause: r.get_str()?,
            num_units: r.get_i32()?,
            most_severe_injury: r.get_str_list()?,
            injuries: Injuries {
                total: r.get_f32()?,
                fatal: r.get_f32()?,
                incapacitating: r.get_f32()?,
                non_incapacitating: r.get_f32()?,
                reported_not_evident: r.get_f32()?,
                no_indication: r.get_f32()?,
            },
            crash_hour: r.get_i32()?,
            crash_day_of_week: r.get_i32()?,
            crash_month: r.get_i32()?,
        })
    }

    fn assign_key(&mut self, key: i32) {
        self.id = key;
    }
}

#[cfg(test)]
pub(crate) fn sample_report(id: i32) -> CrashReport {
    CrashReport {
        id,
        crash_date: "07/29/2023 01:00:00 PM".to_string(),
        epoch_day: 19_567,
        traffic_control_device: "TRAFFIC SIGNAL".to_string(),
        weather_condition: "CLEAR".to_string(),
        lighting_condition: vec!["DAYLIGHT".to_string()],
        first_crash_type: "TURNING".to_string(),
        trafficway_type: "NOT DIVIDED".to_string(),
        alignment: "STRAIGHT AND LEVEL".to_string(),
        roadway_surface_cond: "DRY".to_string(),
        road_defect: "NO DEFECTS".to_string(),
        crash_type: vec!["NO INJURY".to_string(), "DRIVE AWAY".to_string()],
        intersection_related: true,
        damage: "$501 - $1,500".to_string(),
        prim_contributory_cause: "UNABLE TO DETERMINE".to_string(),
        num_units: 2,
        most_severe_injury: vec!["NO INDICATION OF INJURY".to_string()],
        injuries: Injuries {
            total: 0.0,
            fatal: 0.0,
            incapacitating: 0.0,
            non_incapacitating: 0.0,
            reported_not_evident: 0.0,
            no_indication: 3.0,
        },
        crash_hour: 13,
        crash_day_of_week: 7,
        crash_month: 7,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const WORDS: [&str; 8] = [
        "",
        "CLEAR",
        "RUA SÃO JOÃO",
        "ÜBERHOLEN",
        "雨天",
        "🚗💥",
        "$501 - $1,500",
        "NO INDICATION OF INJURY",
    ];

    fn random_text(rng: &mut StdRng) -> String {
        (0..rng.random_range(0..4))
            .map(|_| WORDS[rng.random_range(0..WORDS.len())])
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn random_list(rng: &mut StdRng) -> Vec<String> {
        let len = match rng.random_range(0..3) {
            0 => 0,
            1 => rng.random_range(1..4),
            _ => rng.random_range(50..200),
        };
        (0..len).map(|_| random_text(rng)).collect()
    }

    fn random_report(rng: &mut StdRng) -> CrashReport {
        CrashReport {
            id: rng.random(),
            crash_date: random_text(rng),
            epoch_day: rng.random_range(-1_000_000..1_000_000),
            traffic_control_device: random_text(rng),
            weather_condition: random_text(rng),
            lighting_condition: random_list(rng),
            first_crash_type: random_text(rng),
            trafficway_type: random_text(rng),
            alignment: random_text(rng),
            roadway_surface_cond: random_text(rng),
            road_defect: random_text(rng),
            crash_type: random_list(rng),
            intersection_related: rng.random(),
            damage: random_text(rng),
            prim_contributory_cause: random_text(rng).repeat(rng.random_range(1..50)),
            num_units: rng.random_range(-5..20),
            most_severe_injury: random_list(rng),
            injuries: Injuries {
                total: rng.random_range(-10.0..100.0),
                fatal: rng.random_range(0.0..5.0),
                incapacitating: rng.random_range(-1.0..5.0),
                non_incapacitating: rng.random_range(0.0..10.0),
                reported_not_evident: rng.random_range(0.0..10.0),
                no_indication: rng.random_range(-3.5..30.0),
            },
            crash_hour: rng.random_range(-1..24),
            crash_day_of_week: rng.random_range(1..8),
            crash_month: rng.random_range(i32::MIN..i32::MAX),
        }
    }

    #[test]
    fn test_random_reports_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0xC2A5);
        for _ in 0..200 {
            let report = random_report(&mut rng);
            let bytes = report.encode().expect("encode");
            let decoded = CrashReport::decode(&bytes).expect("decode");
            assert_eq!(decoded, report);
        }
    }

    #[test]
    fn test_crash_report_roundtrip() {
        let report = sample_report(12);
        let bytes = report.encode().expect("encode");
        let decoded = CrashReport::decode(&bytes).expect("decode");
        assert_eq!(decoded, report);
    }

    #[test]
    fn test_empty_lists_roundtrip() {
        let report = CrashReport {
            id: 1,
            ..CrashReport::default()
        };
        let bytes = report.encode().expect("encode");
        assert_eq!(CrashReport::decode(&bytes).expect("decode"), report);
    }

    #[test]
    fn test_decode_ignores_zero_padding() {
        let report = sample_report(3);
        let mut bytes = report.encode().expect("encode");
        bytes.extend_from_slice(&[0u8; 16]);
        assert_eq!(CrashReport::decode(&bytes).expect("decode"), report);
    }

    #[test]
    fn test_truncated_payload_is_malformed() {
        let bytes = sample_report(3).encode().expect("encode");
        let result = CrashReport::decode(&bytes[..bytes.len() - 2]);
        assert!(matches!(result, Err(CodecError::MalformedRecord { .. })));
    }

    #[test]
    fn test_assign_key_sets_id() {
        let mut report = sample_report(0);
        report.assign_key(99);
        assert_eq!(report.id, 99);
    }
}
