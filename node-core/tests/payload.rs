use node_core::sensor::SensorSample;
use node_core::telemetry::{MAX_PAYLOAD_LEN, PAYLOAD_FIELDS, SensorReading};
use serde_json::Value;

#[test]
fn payload_parses_as_flat_object_with_four_numbers() {
    let reading = SensorReading::from_sample(SensorSample::new(-3.75, 95_000.0, 81.5), 1013.25);
    let payload = reading.to_payload().expect("payload fits");

    let value: Value = serde_json::from_str(&payload).expect("valid JSON");
    let object = value.as_object().expect("top-level object");

    assert_eq!(object.len(), PAYLOAD_FIELDS.len());
    for (name, expected) in PAYLOAD_FIELDS.iter().zip(reading.values()) {
        let actual = object
            .get(*name)
            .and_then(Value::as_f64)
            .unwrap_or_else(|| panic!("{name} missing or not a number in {payload}"));
        assert!(
            (actual - f64::from(expected)).abs() < 1e-3,
            "{name}: expected {expected}, got {actual}"
        );
    }
}

#[test]
fn fields_appear_in_publication_order() {
    let payload = SensorReading::new(20.0, 1000.5, 110.25, 55.0)
        .to_payload()
        .expect("payload fits");

    let offsets: Vec<usize> = PAYLOAD_FIELDS
        .iter()
        .map(|name| {
            payload
                .find(&format!("\"{name}\""))
                .unwrap_or_else(|| panic!("{name} missing from {payload}"))
        })
        .collect();

    assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]), "{payload}");
}

#[test]
fn lower_pressure_publishes_positive_altitude() {
    let reading = SensorReading::from_sample(SensorSample::new(12.0, 89_874.6, 60.0), 1013.25);

    assert!(
        (reading.altitude - 1000.0).abs() < 5.0,
        "expected roughly 1000 m, got {}",
        reading.altitude
    );
}

#[test]
fn non_finite_fields_stay_valid_json() {
    let reading = SensorReading::from_sample(SensorSample::invalid(), 1013.25);
    let payload = reading.to_payload().expect("payload fits");
    assert!(payload.len() <= MAX_PAYLOAD_LEN);

    let value: Value = serde_json::from_str(&payload).expect("nulls are valid JSON");
    let object = value.as_object().expect("top-level object");
    assert_eq!(object.len(), 4);
    assert!(object.values().all(Value::is_null));
}
