//! JNI bindings for the watch app.
//!
//! Each public function here corresponds to an `external fun` declaration
//! in NavBridge.kt. The function names follow JNI naming conventions:
//! Java_<package>_<class>_<method> with dots replaced by underscores.
//!
//! Structured values cross the boundary as JSON strings. Failures are
//! logged and returned as `null` (or a 0 session handle) so the Kotlin side
//! can fall back to its "no track loaded" state.

use jni::objects::{JByteArray, JClass, JString};
use jni::sys::{jboolean, jdouble, jfloat, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use serde::Serialize;

use crate::config::{NavConfig, RadarConfig};
use crate::direction::should_update_direction;
use crate::error::Result;
use crate::geo::{bearing_and_distance, GpsFix, SimplePoint};
use crate::gpx;
use crate::nav::{Advance, TrackFollower};
use crate::radar::{build_radar, MemberInfo};

/// What the watch face needs after each fix.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AdvanceResponse {
    #[serde(flatten)]
    advance: Advance,
    /// Bearing from the fix to the target, for the compass arrow.
    bearing_deg: f64,
    distance_m: f64,
}

fn create_session(track_gpx: &[u8], config_json: &str) -> Result<TrackFollower> {
    let track = gpx::load_track(track_gpx)?;
    let config = NavConfig::from_json(config_json)?;
    Ok(TrackFollower::new(track, config))
}

/// `None` when the fix is too coarse to use; the session is left untouched.
fn advance_json(follower: &mut TrackFollower, fix: &GpsFix) -> Result<Option<String>> {
    let max_accuracy_m = follower.config().max_fix_accuracy_m;
    if !fix.is_usable(max_accuracy_m) {
        log::debug!(
            "dropping fix at {:.5},{:.5} (accuracy {} m, limit {max_accuracy_m} m)",
            fix.lat,
            fix.lon,
            fix.accuracy_m
        );
        return Ok(None);
    }

    let position = SimplePoint::from(fix);
    let advance = follower.advance(&position);
    let (distance_m, bearing_deg) = bearing_and_distance(&position, &SimplePoint::from(&advance.target));
    let response = AdvanceResponse {
        advance,
        bearing_deg,
        distance_m,
    };
    Ok(Some(serde_json::to_string(&response)?))
}

fn radar_json(user_json: &str, heading: f64, peers_json: &str, config_json: &str) -> Result<String> {
    let user: SimplePoint = serde_json::from_str(user_json)?;
    let peers: Vec<MemberInfo> = serde_json::from_str(peers_json)?;
    let config = RadarConfig::from_json(config_json)?;
    Ok(serde_json::to_string(&build_radar(&user, heading, &peers, &config))?)
}

fn into_jstring(env: &mut JNIEnv, value: Result<String>) -> jstring {
    let text = match value {
        Ok(text) => text,
        Err(e) => {
            log::error!("{e}");
            return std::ptr::null_mut();
        }
    };
    match env.new_string(text) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            log::error!("failed to create Java string: {e}");
            std::ptr::null_mut()
        }
    }
}

fn read_string(env: &mut JNIEnv, value: &JString) -> String {
    if value.is_null() {
        return String::new();
    }
    match env.get_string(value) {
        Ok(s) => s.into(),
        Err(e) => {
            log::warn!("unreadable Java string: {e}");
            String::new()
        }
    }
}

/// Borrow the session behind a handle.
///
/// # Safety
///
/// `handle` must come from `createSession`, must not have been destroyed,
/// and must not be used from two threads at once.
unsafe fn session<'a>(handle: jlong) -> Option<&'a mut TrackFollower> {
    (handle as *mut TrackFollower).as_mut()
}

/// Returns the library version.
/// Maps to: NavBridge.version() -> String
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_version(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    into_jstring(&mut env, Ok(crate::VERSION.to_string()))
}

/// Routes `log` output to logcat.
/// Maps to: NavBridge.initLogging()
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_initLogging(
    _env: JNIEnv,
    _class: JClass,
) {
    crate::init_logging();
}

/// Parses GPX bytes into a track.
/// Maps to: NavBridge.loadTrack(ByteArray) -> String? (track JSON)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_loadTrack(
    mut env: JNIEnv,
    _class: JClass,
    data: JByteArray,
) -> jstring {
    let result = match env.convert_byte_array(&data) {
        Ok(bytes) => gpx::load_track_json(&bytes),
        Err(e) => {
            log::error!("failed to read track bytes: {e}");
            return std::ptr::null_mut();
        }
    };
    into_jstring(&mut env, result)
}

/// Starts following a track.
/// Maps to: NavBridge.createSession(ByteArray, String) -> Long (0 on failure)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_createSession(
    mut env: JNIEnv,
    _class: JClass,
    track_gpx: JByteArray,
    config_json: JString,
) -> jlong {
    let bytes = match env.convert_byte_array(&track_gpx) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::error!("failed to read track bytes: {e}");
            return 0;
        }
    };
    let config_json = read_string(&mut env, &config_json);

    match create_session(&bytes, &config_json) {
        Ok(follower) => {
            log::info!("session started on {} points", follower.track().len());
            Box::into_raw(Box::new(follower)) as jlong
        }
        Err(e) => {
            log::error!("cannot start session: {e}");
            0
        }
    }
}

/// Processes one GPS fix. Returns null for a fix that is dropped as too
/// coarse, as well as on failure.
/// Maps to: NavBridge.advance(Long, Double, Double, Double, Boolean, Float, Long) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_advance(
    mut env: JNIEnv,
    _class: JClass,
    handle: jlong,
    lat: jdouble,
    lon: jdouble,
    ele: jdouble,
    has_ele: jboolean,
    accuracy: jfloat,
    timestamp_ms: jlong,
) -> jstring {
    // SAFETY: the Kotlin side owns the handle and serializes calls on it.
    let Some(follower) = (unsafe { session(handle) }) else {
        log::error!("advance on a null session");
        return std::ptr::null_mut();
    };
    let fix = GpsFix {
        lat,
        lon,
        ele: (has_ele == JNI_TRUE).then_some(ele),
        accuracy_m: accuracy,
        timestamp_ms,
    };
    match advance_json(follower, &fix) {
        Ok(None) => std::ptr::null_mut(),
        Ok(Some(json)) => into_jstring(&mut env, Ok(json)),
        Err(e) => into_jstring(&mut env, Err(e)),
    }
}

/// Maps to: NavBridge.resetSession(Long)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_resetSession(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    // SAFETY: see `advance`.
    if let Some(follower) = unsafe { session(handle) } {
        follower.reset();
    }
}

/// Maps to: NavBridge.destroySession(Long)
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_destroySession(
    _env: JNIEnv,
    _class: JClass,
    handle: jlong,
) {
    if handle == 0 {
        return;
    }
    // SAFETY: the handle came from Box::into_raw in createSession and the
    // Kotlin side never uses it again after this call.
    drop(unsafe { Box::from_raw(handle as *mut TrackFollower) });
}

/// Maps to: NavBridge.shouldUpdateDirection(Double, Double, Boolean, Double) -> Boolean
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_shouldUpdateDirection(
    _env: JNIEnv,
    _class: JClass,
    new: jdouble,
    old: jdouble,
    has_old: jboolean,
    threshold: jdouble,
) -> jboolean {
    let old = (has_old == JNI_TRUE).then_some(old);
    if should_update_direction(new, old, threshold) {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

/// Projects and clusters the group for one radar frame.
/// Maps to: NavBridge.projectRadar(String, Double, String, String) -> String?
#[unsafe(no_mangle)]
pub extern "system" fn Java_com_hikenav_wear_NavBridge_projectRadar(
    mut env: JNIEnv,
    _class: JClass,
    user_json: JString,
    heading: jdouble,
    peers_json: JString,
    config_json: JString,
) -> jstring {
    let user_json = read_string(&mut env, &user_json);
    let peers_json = read_string(&mut env, &peers_json);
    let config_json = read_string(&mut env, &config_json);

    let result = radar_json(&user_json, heading, &peers_json, &config_json);
    into_jstring(&mut env, result)
}
