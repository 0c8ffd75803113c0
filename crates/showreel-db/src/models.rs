/// Database row types — these map directly to SQLite rows.
/// Distinct from the showreel-types API models so the password hash and
/// stored refresh token never cross the persistence boundary by accident.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar_url: String,
    pub cover_image_url: Option<String>,
    pub password_hash: String,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct VideoRow {
    pub id: String,
    pub media_url: String,
    pub thumbnail_url: String,
    pub title: String,
    pub description: String,
    pub duration_secs: f64,
    pub views: i64,
    pub is_published: bool,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}
