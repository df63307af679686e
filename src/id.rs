use uuid::Uuid;

/// Time-ordered ids for system-generated documents.
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Invoice-style ids keep a short random suffix so operators can read them
/// aloud.
pub fn new_invoice_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("INV-{}", &suffix[..8].to_uppercase())
}
