use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Error body, same shape the Python backend returned
#[derive(Deserialize, Serialize, Debug)]
pub struct ErrorBody {
    pub detail: String,
}

// Successful admission under a policy
#[derive(Deserialize, Serialize, Debug)]
pub struct AdmissionResponse {
    pub admitted: bool,
    pub policy: String,
    pub remaining: u32,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub app: String,
    pub timestamp: DateTime<Utc>,
}
