use glam::Vec3;

use crate::protocol::EntitySample;

/// Projects a sample forward by one round trip: `pos.xy += speed * rtt`.
///
/// Applied once when a snapshot is applied; the result is not advanced
/// further between snapshots.
pub fn extrapolate(sample: &EntitySample, round_trip_time: f32) -> EntitySample {
    let offset = sample.speed * round_trip_time;
    EntitySample {
        pos: sample.pos + Vec3::new(offset.x, offset.y, 0.0),
        ..*sample
    }
}
