use helf_chat::backend::AvatarResolver;

/// Bucket holding profile pictures.
pub const AVATARS_BUCKET: &str = "avatars";

/// Public object URLs in a storage bucket.
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    base: String,
    bucket: String,
}

impl SupabaseStorage {
    pub fn new(project_url: &str, bucket: &str) -> Self {
        Self {
            base: project_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
        }
    }
}

impl AvatarResolver for SupabaseStorage {
    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}
