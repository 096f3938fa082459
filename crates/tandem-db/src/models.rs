/// Raw user row; the password column holds the argon2 PHC string.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub premium: bool,
    pub created_at: String,
}
