use crate::auth::{AuthService, INVALID_CREDENTIALS, Registration};
use crate::config::Config;
use crate::db::{
    Book, BookFields, Database, ProfileUpdate, Role, Session, User, new_id, now_timestamp,
};
use crate::error::AppError;
use crate::library::{self, FavoriteAction, LibraryStats};

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn test_auth(db: &Database) -> AuthService {
    AuthService::new(db.clone(), 30, true).with_admin_code(Some("ADMIN2024"))
}

fn create_user(db: &Database, username: &str) -> User {
    let user = User {
        id: new_id(),
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password_hash: "hash".to_string(),
        role: Role::Client,
        is_active: true,
        favorites: Vec::new(),
        created_at: now_timestamp(),
        last_login: None,
    };
    db.create_user(&user).unwrap();
    user
}

fn create_book(db: &Database, title: &str, author: &str, genre: &str) -> Book {
    db.create_book(&BookFields {
        title: title.to_string(),
        author: author.to_string(),
        genre: genre.to_string(),
        year: 1990,
        description: String::new(),
        image: None,
    })
    .unwrap()
}

fn registration(username: &str, password: &str, confirm: &str) -> Registration {
    Registration {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        password: password.to_string(),
        confirm_password: confirm.to_string(),
        role: None,
    }
}

// ========== STORE ==========

#[test]
fn db_create_and_get_user() {
    let db = test_db();
    let user = create_user(&db, "alice");

    let found = db.get_user_by_username("alice").unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.email, "alice@example.com");
    assert_eq!(found.role, Role::Client);
    assert!(found.favorites.is_empty());

    let by_id = db.get_user_by_id(&user.id).unwrap().unwrap();
    assert_eq!(by_id.username, "alice");
}

#[test]
fn db_malformed_ids_are_not_found() {
    let db = test_db();
    create_user(&db, "alice");
    create_book(&db, "Dune", "Frank Herbert", "Sci-Fi");

    assert!(db.get_user_by_id("not-an-id").unwrap().is_none());
    assert!(db.get_book("../etc").unwrap().is_none());
    assert!(!db.delete_book("42").unwrap());
    assert!(!db.delete_user("").unwrap());
}

#[test]
fn db_duplicate_username_fails() {
    let db = test_db();
    create_user(&db, "alice");

    let twin = User {
        id: new_id(),
        username: "alice".to_string(),
        email: "other@example.com".to_string(),
        password_hash: "hash2".to_string(),
        role: Role::Client,
        is_active: true,
        favorites: Vec::new(),
        created_at: now_timestamp(),
        last_login: None,
    };

    match db.create_user(&twin) {
        Err(AppError::Validation(message)) => assert_eq!(message, "Username already exists"),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(db.count_users().unwrap(), 1);
}

#[test]
fn db_delete_user_cascades_sessions() {
    let db = test_db();
    let user = create_user(&db, "bob");
    db.create_session(&Session {
        token: "token456".to_string(),
        user_id: user.id.clone(),
        expires_at: now_timestamp() + 3600,
    })
    .unwrap();

    assert!(db.delete_user(&user.id).unwrap());
    assert!(db.get_user_by_username("bob").unwrap().is_none());
    assert!(db.get_session("token456").unwrap().is_none());
}

#[test]
fn db_expired_sessions_cleanup() {
    let db = test_db();
    let user = create_user(&db, "testuser");

    let expired = Session {
        token: "expired".to_string(),
        user_id: user.id.clone(),
        expires_at: now_timestamp() - 3600,
    };
    let valid = Session {
        token: "valid".to_string(),
        user_id: user.id.clone(),
        expires_at: now_timestamp() + 3600,
    };

    db.create_session(&expired).unwrap();
    db.create_session(&valid).unwrap();

    assert_eq!(db.cleanup_expired_sessions().unwrap(), 1);
    assert!(db.get_session("expired").unwrap().is_none());
    assert!(db.get_session("valid").unwrap().is_some());
}

#[test]
fn db_books_keep_insertion_order() {
    let db = test_db();
    create_book(&db, "First", "A", "Drama");
    create_book(&db, "Second", "B", "Drama");
    create_book(&db, "Third", "C", "Drama");

    let titles: Vec<_> = db.list_books().unwrap().into_iter().map(|b| b.title).collect();
    assert_eq!(titles, ["First", "Second", "Third"]);
    assert_eq!(db.count_books().unwrap(), 3);
}

#[test]
fn db_update_and_delete_book() {
    let db = test_db();
    let book = create_book(&db, "Dune", "Frank Herbert", "Sci-Fi");

    let mut fields = BookFields::from(&book);
    fields.year = 1965;
    fields.image = Some("dune.png".to_string());
    assert!(db.update_book(&book.id, &fields).unwrap());

    let updated = db.get_book(&book.id).unwrap().unwrap();
    assert_eq!(updated.year, 1965);
    assert_eq!(updated.image.as_deref(), Some("dune.png"));

    assert!(db.delete_book(&book.id).unwrap());
    assert!(db.get_book(&book.id).unwrap().is_none());
    assert!(!db.update_book(&book.id, &fields).unwrap());
}

#[test]
fn db_search_matches_author_substring_case_insensitively() {
    let db = test_db();
    let dune = create_book(&db, "Dune", "Frank Herbert", "Sci-Fi");
    let messiah = create_book(&db, "Dune Messiah", "Frank HERBERT", "Sci-Fi");
    create_book(&db, "Emma", "Jane Austen", "Romance");

    let ids: Vec<_> = db
        .search_books("herb")
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, [dune.id, messiah.id]);

    let by_title = db.search_books("EMM").unwrap();
    assert_eq!(by_title.len(), 1);
    assert_eq!(by_title[0].title, "Emma");

    assert!(db.search_books("tolkien").unwrap().is_empty());
}

#[test]
fn db_favorites_are_a_set() {
    let db = test_db();
    let user = create_user(&db, "reader");
    let book = create_book(&db, "Dune", "Frank Herbert", "Sci-Fi");

    assert!(db.add_favorite(&user.id, &book.id).unwrap());
    assert!(!db.add_favorite(&user.id, &book.id).unwrap());
    assert_eq!(db.get_favorites(&user.id).unwrap(), [book.id.clone()]);

    let other = new_id();
    assert!(!db.remove_favorite(&user.id, &other).unwrap());
    assert_eq!(db.get_favorites(&user.id).unwrap().len(), 1);

    assert!(db.remove_favorite(&user.id, &book.id).unwrap());
    assert!(db.get_favorites(&user.id).unwrap().is_empty());
}

#[test]
fn db_profile_update_keeps_blank_fields() {
    let db = test_db();
    let user = create_user(&db, "carol");

    let update = ProfileUpdate::from_form(Some("  "), Some("carol@new.example"));
    assert!(db.update_user_profile(&user.id, &update).unwrap());

    let found = db.get_user_by_id(&user.id).unwrap().unwrap();
    assert_eq!(found.username, "carol");
    assert_eq!(found.email, "carol@new.example");
}

// ========== AUTH ==========

#[test]
fn auth_register_then_login() {
    let db = test_db();
    let auth = test_auth(&db);

    let user = auth
        .register(&registration("testuser", "password123", "password123"))
        .unwrap();
    assert_eq!(user.role, Role::Client);

    let (logged_in, token) = auth.login("testuser", "password123").unwrap();
    assert_eq!(logged_in.id, user.id);
    assert!(!token.is_empty());

    let session_user = auth.validate_token(&token).unwrap().unwrap();
    assert_eq!(session_user.id, user.id);
    assert!(session_user.last_login.is_some());
}

#[test]
fn auth_register_only_checks_confirmation_and_uniqueness() {
    let db = test_db();
    let auth = test_auth(&db);

    let form = Registration {
        username: "John Doe".to_string(),
        email: "jd".to_string(),
        password: "abc".to_string(),
        confirm_password: "abc".to_string(),
        role: None,
    };
    let user = auth.register(&form).unwrap();
    assert_eq!(user.username, "John Doe");
    assert_eq!(user.email, "jd");
    assert!(auth.login("John Doe", "abc").is_ok());

    // The CLI path keeps its stricter rules.
    let strict = auth.create_user("Jane Doe", "jane@example.com", "password123", Role::Client);
    assert!(strict.is_err());
}

#[test]
fn auth_register_rejects_mismatched_passwords() {
    let db = test_db();
    let auth = test_auth(&db);

    match auth.register(&registration("dave", "password123", "password124")) {
        Err(AppError::Validation(message)) => assert_eq!(message, "Passwords do not match"),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(db.count_users().unwrap(), 0);
}

#[test]
fn auth_register_rejects_duplicate_username() {
    let db = test_db();
    let auth = test_auth(&db);

    auth.register(&registration("erin", "password123", "password123"))
        .unwrap();
    match auth.register(&registration("erin", "password456", "password456")) {
        Err(AppError::Validation(message)) => assert_eq!(message, "Username already exists"),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn auth_register_ignores_role_unless_selection_allowed() {
    let db = test_db();
    let mut form = registration("mallory", "password123", "password123");
    form.role = Some("admin".to_string());

    let user = test_auth(&db).register(&form).unwrap();
    assert_eq!(user.role, Role::Client);

    let selecting = test_auth(&db).with_role_selection(true);
    let mut form = registration("trent", "password123", "password123");
    form.role = Some("admin".to_string());
    assert_eq!(selecting.register(&form).unwrap().role, Role::Admin);

    let mut form = registration("oscar", "password123", "password123");
    form.role = Some("super_admin".to_string());
    assert!(matches!(
        selecting.register(&form),
        Err(AppError::Validation(message)) if message == "Invalid role specified"
    ));
}

#[test]
fn auth_registration_disabled() {
    let db = test_db();
    let auth = AuthService::new(db, 30, false);

    let result = auth.register(&registration("newuser", "password123", "password123"));
    assert!(result.is_err());
}

#[test]
fn auth_register_admin_checks_code_first() {
    let db = test_db();
    let auth = test_auth(&db);

    // Wrong code wins over mismatched passwords.
    match auth.register_admin(&registration("boss", "password123", "nope"), "WRONG") {
        Err(AppError::Validation(message)) => assert_eq!(message, "Invalid admin code"),
        other => panic!("expected validation error, got {:?}", other),
    }

    let admin = auth
        .register_admin(&registration("boss", "password123", "password123"), "ADMIN2024")
        .unwrap();
    assert_eq!(admin.role, Role::Admin);
}

#[test]
fn auth_register_admin_disabled_without_code() {
    let db = test_db();
    let auth = AuthService::new(db.clone(), 30, true).with_admin_code(None);

    let result = auth.register_admin(&registration("boss", "password123", "password123"), "");
    assert!(result.is_err());
    assert_eq!(db.count_users().unwrap(), 0);
}

#[test]
fn auth_wrong_password_and_unknown_user_look_the_same() {
    let db = test_db();
    let auth = test_auth(&db);
    auth.create_user("user", "user@example.com", "correct-horse", Role::Client)
        .unwrap();

    let wrong_password = auth.login("user", "wrong-horse").unwrap_err();
    let unknown_user = auth.login("nobody", "correct-horse").unwrap_err();

    assert_eq!(wrong_password.to_string(), INVALID_CREDENTIALS);
    assert_eq!(unknown_user.to_string(), INVALID_CREDENTIALS);
}

#[test]
fn auth_disabled_account_cannot_log_in() {
    let db = test_db();
    let auth = test_auth(&db);
    auth.create_user("sleepy", "sleepy@example.com", "password123", Role::Client)
        .unwrap();
    let (_, token) = auth.login("sleepy", "password123").unwrap();

    assert!(auth.set_active("sleepy", false).unwrap());

    let err = auth.login("sleepy", "password123").unwrap_err();
    assert_eq!(err.to_string(), INVALID_CREDENTIALS);
    assert!(auth.validate_token(&token).unwrap().is_none());
}

#[test]
fn auth_logout() {
    let db = test_db();
    let auth = test_auth(&db);

    auth.create_user("bob", "bob@example.com", "password", Role::Client)
        .unwrap();
    let (_, token) = auth.login("bob", "password").unwrap();

    auth.logout(&token).unwrap();
    assert!(auth.validate_token(&token).unwrap().is_none());
}

#[test]
fn auth_expired_session_is_rejected() {
    let db = test_db();
    let auth = test_auth(&db);
    let user = auth
        .create_user("late", "late@example.com", "password123", Role::Client)
        .unwrap();

    db.create_session(&Session {
        token: "stale".to_string(),
        user_id: user.id,
        expires_at: now_timestamp() - 1,
    })
    .unwrap();

    assert!(auth.validate_token("stale").unwrap().is_none());
    assert!(db.get_session("stale").unwrap().is_none());
}

#[test]
fn auth_change_password() {
    let db = test_db();
    let auth = test_auth(&db);
    let user = auth
        .create_user("user", "user@example.com", "oldpass1", Role::Admin)
        .unwrap();

    let err = auth
        .change_password(&user, "not-it", "newpass1", "newpass1")
        .unwrap_err();
    assert_eq!(err.to_string(), "Current password is incorrect");

    let err = auth
        .change_password(&user, "oldpass1", "newpass1", "newpass2")
        .unwrap_err();
    assert_eq!(err.to_string(), "New passwords do not match");

    let err = auth
        .change_password(&user, "oldpass1", "short", "short")
        .unwrap_err();
    assert_eq!(err.to_string(), "Password must be at least 6 characters long");

    auth.change_password(&user, "oldpass1", "newpass1", "newpass1")
        .unwrap();
    assert!(auth.login("user", "oldpass1").is_err());
    assert!(auth.login("user", "newpass1").is_ok());
}

#[test]
fn auth_invalid_username_rejected() {
    let db = test_db();
    let auth = test_auth(&db);

    assert!(auth.create_user("user@email", "a@b.c", "password", Role::Client).is_err());
    assert!(auth.create_user("user name", "a@b.c", "password", Role::Client).is_err());
    assert!(auth.create_user("", "a@b.c", "password", Role::Client).is_err());
    assert!(auth.create_user("fine", "no-at-sign", "password", Role::Client).is_err());
}

#[test]
fn auth_update_role_restricts_targets() {
    let db = test_db();
    let auth = test_auth(&db);
    let user = create_user(&db, "promotee");

    auth.update_role(&user.id, "admin").unwrap();
    assert_eq!(db.get_user_by_id(&user.id).unwrap().unwrap().role, Role::Admin);

    let err = auth.update_role(&user.id, "super_admin").unwrap_err();
    assert_eq!(err.to_string(), "Invalid role specified");

    let err = auth.update_role(&new_id(), "client").unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.to_string(), "User not found");
}

#[test]
fn auth_admin_cannot_delete_self() {
    let db = test_db();
    let auth = test_auth(&db);
    let admin = auth
        .create_user("root", "root@example.com", "password123", Role::Admin)
        .unwrap();
    let victim = create_user(&db, "victim");

    let err = auth.delete_user(&admin, &admin.id).unwrap_err();
    assert_eq!(err.to_string(), "Cannot delete your own account");
    assert!(db.get_user_by_id(&admin.id).unwrap().is_some());

    auth.delete_user(&admin, &victim.id).unwrap();
    assert!(db.get_user_by_id(&victim.id).unwrap().is_none());

    let err = auth.delete_user(&admin, &victim.id).unwrap_err();
    assert_eq!(err.to_string(), "User not found");
}

#[test]
fn auth_update_profile_checks_uniqueness_excluding_self() {
    let db = test_db();
    let auth = test_auth(&db);
    let admin = auth
        .create_user("root", "root@example.com", "password123", Role::Admin)
        .unwrap();
    create_user(&db, "taken");

    let err = auth
        .update_profile(&admin, &ProfileUpdate::from_form(Some("taken"), None))
        .unwrap_err();
    assert_eq!(err.to_string(), "Username already exists");

    // Keeping one's own name is fine.
    let same = auth
        .update_profile(&admin, &ProfileUpdate::from_form(Some("root"), Some("new@example.com")))
        .unwrap();
    assert_eq!(same.username, "root");
    assert_eq!(same.email, "new@example.com");
}

#[test]
fn auth_bootstrap_recreates_super_admin() {
    let db = test_db();
    let auth = test_auth(&db);
    let old = create_user(&db, "admin");

    let admin = auth
        .bootstrap_admin("admin", "admin@booklibrary.com", "admin123")
        .unwrap();
    assert_ne!(admin.id, old.id);
    assert_eq!(admin.role, Role::SuperAdmin);
    assert!(admin.is_admin());
    assert!(auth.login("admin", "admin123").is_ok());
    assert_eq!(db.count_users().unwrap(), 1);
}

// ========== LIBRARY ==========

#[test]
fn library_browse_searches_then_filters_genre() {
    let db = test_db();
    create_book(&db, "Dune", "Frank Herbert", "Sci-Fi");
    create_book(&db, "The Dune Diaries", "Someone Else", "Memoir");
    create_book(&db, "Emma", "Jane Austen", "Romance");

    let books = library::browse(&db, Some("dune"), Some("sci-fi")).unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].title, "Dune");

    let all = library::browse(&db, Some("  "), None).unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn library_toggle_alternates() {
    let db = test_db();
    let user = create_user(&db, "reader");
    let book = create_book(&db, "Dune", "Frank Herbert", "Sci-Fi");

    let first = library::toggle_favorite(&db, &user.id, &book.id).unwrap();
    assert_eq!(first.action, FavoriteAction::Added);
    assert!(first.is_favorite);

    let second = library::toggle_favorite(&db, &user.id, &book.id).unwrap();
    assert_eq!(second.action, FavoriteAction::Removed);
    assert!(!second.is_favorite);

    let missing = library::toggle_favorite(&db, &user.id, &new_id()).unwrap_err();
    assert_eq!(missing.to_string(), "Book not found");
}

#[test]
fn library_deleted_favorites_are_skipped_but_kept() {
    let db = test_db();
    let user = create_user(&db, "reader");
    let dune = create_book(&db, "Dune", "Frank Herbert", "Sci-Fi");
    let emma = create_book(&db, "Emma", "Jane Austen", "Romance");

    db.add_favorite(&user.id, &dune.id).unwrap();
    db.add_favorite(&user.id, &emma.id).unwrap();
    db.delete_book(&dune.id).unwrap();

    let favorites = db.get_favorites(&user.id).unwrap();
    assert_eq!(favorites.len(), 2);

    let books = library::resolve_favorites(&db, &favorites).unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].id, emma.id);
}

#[test]
fn library_stats_tallies_sum_to_totals() {
    let db = test_db();
    let auth = test_auth(&db);
    create_book(&db, "Dune", "Frank Herbert", "Sci-Fi");
    create_book(&db, "Hyperion", "Dan Simmons", "Sci-Fi");
    create_book(&db, "Untitled", "Anon", "");
    create_user(&db, "reader");
    auth.create_user("boss", "boss@example.com", "password123", Role::Admin)
        .unwrap();
    auth.bootstrap_admin("root", "root@example.com", "password123")
        .unwrap();

    let stats = LibraryStats::collect(&db).unwrap();
    assert_eq!(stats.total_books, 3);
    assert_eq!(stats.total_users, 3);
    assert_eq!(stats.genres.get("Sci-Fi"), Some(&2));
    assert_eq!(stats.genres.get("Unknown"), Some(&1));
    assert_eq!(stats.genres.values().sum::<usize>(), stats.total_books);
    assert_eq!(stats.user_roles.get("client"), Some(&1));
    assert_eq!(stats.user_roles.get("admin"), Some(&1));
    assert_eq!(stats.user_roles.get("super_admin"), Some(&1));
    assert_eq!(stats.user_roles.values().sum::<usize>(), stats.total_users);
}

#[test]
fn library_stats_always_report_admin_and_client() {
    let stats = LibraryStats::collect(&test_db()).unwrap();
    assert_eq!(stats.total_books, 0);
    assert_eq!(stats.user_roles.get("admin"), Some(&0));
    assert_eq!(stats.user_roles.get("client"), Some(&0));
}

// ========== CONFIG ==========

#[test]
fn config_parse_toml() {
    let toml = r#"
[server]
bind = "127.0.0.1:9090"
title = "Test Library"

[database]
path = "/tmp/test.db"

[auth]
registration = "disabled"
session_days = 7
admin_code = ""
open_book_editing = true

[uploads]
dir = "/tmp/covers"
max_bytes = 1024
"#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.bind.port(), 9090);
    assert_eq!(config.server.title, "Test Library");
    assert!(!config.auth.registration_enabled());
    assert_eq!(config.auth.session_days, 7);
    assert!(config.auth.admin_code().is_none());
    assert!(config.auth.open_book_editing);
    assert!(!config.auth.allow_role_selection);
    assert_eq!(config.uploads.max_bytes, 1024);
    assert!(!config.bootstrap.enabled);
}

#[test]
fn config_default_values() {
    let config = Config::default();
    assert_eq!(config.server.bind.port(), 5001);
    assert!(config.auth.registration_enabled());
    assert_eq!(config.auth.admin_code(), Some("ADMIN2024"));
    assert!(!config.auth.open_book_editing);
    assert!(!config.bootstrap.enabled);
}

#[test]
fn config_generated_default_parses() {
    let config: Config = toml::from_str(&Config::generate_default()).unwrap();
    assert_eq!(config.server.title, "Book Library");
    assert_eq!(config.auth.session_days, 30);
    assert_eq!(config.uploads.max_bytes, 16 * 1024 * 1024);
}
