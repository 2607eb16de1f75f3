//! Custom Resource Definitions for the Android SDK operator

mod android_sdk;

pub use android_sdk::{
    AndroidSDK, AndroidSdkSpec, AndroidSdkStatus, SdkPhase, DEFAULT_ENVIRONMENT_NAME,
};
