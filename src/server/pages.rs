//! HTML pages.
//!
//! Pages are plain `format!` templates around a shared layout. Every value
//! coming from the store or the request goes through [`escape`].

use crate::db::{Book, User};
use crate::server::AppState;
use crate::server::session::{FLASH_COOKIE, Flash, clear_cookie, with_cookie};
use axum::response::{Html, IntoResponse, Response};

/// Escape text for HTML bodies and attribute values.
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Wrap a page body in the layout. A displayed flash message is cleared.
pub fn render(
    state: &AppState,
    user: Option<&User>,
    flash: Option<&Flash>,
    title: &str,
    body: &str,
) -> Response {
    let html = layout(state.title(), user, flash, title, body);
    let response = Html(html).into_response();

    if flash.is_some() {
        with_cookie(response, &clear_cookie(FLASH_COOKIE))
    } else {
        response
    }
}

fn layout(
    site: &str,
    user: Option<&User>,
    flash: Option<&Flash>,
    title: &str,
    body: &str,
) -> String {
    let flash_html = flash
        .map(|f| {
            format!(
                r#"<div class="flash flash-{}">{}</div>"#,
                f.category(),
                escape(&f.message)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - {site}</title>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 960px; margin: 0 auto; padding: 0 1rem 2rem; color: #222; }}
        nav {{ display: flex; gap: 1rem; align-items: center; padding: 1rem 0; border-bottom: 1px solid #ddd; margin-bottom: 1rem; }}
        nav .brand {{ font-weight: bold; margin-right: auto; }}
        a {{ color: #0066cc; }}
        .flash {{ padding: 0.75rem 1rem; border-radius: 6px; margin: 1rem 0; }}
        .flash-success {{ background: #e6f6ea; }}
        .flash-error {{ background: #fdecea; }}
        .flash-info {{ background: #e8f0fe; }}
        .stats {{ display: flex; gap: 1rem; }}
        .stats div {{ background: #f5f5f5; padding: 1rem; border-radius: 8px; }}
        .book {{ border-bottom: 1px solid #eee; padding: 0.5rem 0; }}
        .book img, .cover {{ max-height: 160px; }}
        .muted {{ color: #777; }}
        table {{ border-collapse: collapse; width: 100%; }}
        td, th {{ border-bottom: 1px solid #eee; padding: 0.4rem; text-align: left; }}
        form.inline {{ display: inline; }}
        label {{ display: block; margin-top: 0.5rem; }}
    </style>
</head>
<body>
    {nav}
    {flash_html}
    <h1>{title}</h1>
    {body}
</body>
</html>"#,
        site = escape(site),
        title = escape(title),
        nav = nav(site, user),
        flash_html = flash_html,
        body = body,
    )
}

fn nav(site: &str, user: Option<&User>) -> String {
    let links = match user {
        None => r#"<a href="/books">Books</a>
        <a href="/search">Search</a>
        <a href="/auth/login">Login</a>
        <a href="/auth/register">Register</a>"#
            .to_string(),
        Some(user) if user.is_admin() => format!(
            r#"<a href="/admin/dashboard">Dashboard</a>
        <a href="/admin/books">Books</a>
        <a href="/books/add">Add Book</a>
        <a href="/admin/users">Users</a>
        <a href="/admin/profile">{}</a>
        <a href="/auth/logout">Logout</a>"#,
            escape(&user.username)
        ),
        Some(user) => format!(
            r#"<a href="/client/dashboard">Dashboard</a>
        <a href="/client/books">Books</a>
        <a href="/client/favorites">Favorites</a>
        <a href="/client/profile">{}</a>
        <a href="/auth/logout">Logout</a>"#,
            escape(&user.username)
        ),
    };

    format!(
        r#"<nav><a class="brand" href="/">{}</a>
        {}</nav>"#,
        escape(site),
        links
    )
}

fn cover(book: &Book) -> String {
    book.image
        .as_deref()
        .map(|image| {
            format!(
                r#"<img class="cover" src="/static/uploads/{}" alt="{}">"#,
                urlencoding::encode(image),
                escape(&book.title)
            )
        })
        .unwrap_or_default()
}

/// Short listing of books linking to `{detail_base}/{id}`.
pub fn book_items(books: &[Book], detail_base: &str) -> String {
    if books.is_empty() {
        return r#"<p class="muted">No books found.</p>"#.to_string();
    }

    books
        .iter()
        .map(|book| {
            format!(
                r#"<div class="book"><a href="{base}/{id}"><strong>{title}</strong></a>
    <span class="muted">by {author} ({year}) &middot; {genre}</span></div>"#,
                base = detail_base,
                id = book.id,
                title = escape(&book.title),
                author = escape(&book.author),
                year = book.year,
                genre = escape(&book.genre),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Landing page.
pub fn index(book_count: usize, user: Option<&User>) -> String {
    let call_to_action = match user {
        Some(user) => format!(
            r#"<p>Welcome back, {}. Go to your <a href="{}">dashboard</a>.</p>"#,
            escape(&user.username),
            crate::server::session::dashboard_for(user)
        ),
        None => r#"<p><a href="/auth/login">Log in</a> or <a href="/auth/register">create an account</a> to keep favorites.</p>"#.to_string(),
    };

    format!(
        r#"<div class="stats"><div><strong>{book_count}</strong> books in the library</div></div>
    {call_to_action}
    <p><a href="/books">Browse the catalog</a> &middot; <a href="/search">Search</a></p>"#
    )
}

/// Filters shared by the book list pages.
pub struct ListFilters<'a> {
    /// Form action.
    pub action: &'a str,
    /// Current search text.
    pub search: &'a str,
    /// Current genre.
    pub genre: &'a str,
    /// Genres offered in the dropdown; a text field is shown when `None`.
    pub genres: Option<&'a [String]>,
}

/// Book list with search and genre filters.
pub fn book_list(books: &[Book], filters: &ListFilters<'_>, detail_base: &str) -> String {
    let genre_input = match filters.genres {
        Some(genres) => {
            let options: String = genres
                .iter()
                .map(|g| {
                    let selected = if g.eq_ignore_ascii_case(filters.genre) {
                        " selected"
                    } else {
                        ""
                    };
                    format!(
                        r#"<option value="{0}"{1}>{0}</option>"#,
                        escape(g),
                        selected
                    )
                })
                .collect();
            format!(r#"<select name="genre"><option value="">All genres</option>{options}</select>"#)
        }
        None => format!(
            r#"<input name="genre" placeholder="Genre" value="{}">"#,
            escape(filters.genre)
        ),
    };

    format!(
        r#"<form method="get" action="{action}">
        <input name="search" placeholder="Title or author" value="{search}">
        {genre_input}
        <button type="submit">Filter</button>
    </form>
    <p class="muted">{count} book(s)</p>
    {items}"#,
        action = filters.action,
        search = escape(filters.search),
        genre_input = genre_input,
        count = books.len(),
        items = book_items(books, detail_base),
    )
}

/// What the viewer may do on a book detail page.
pub struct DetailActions {
    /// Show favorite controls.
    pub signed_in: bool,
    /// Whether the book is already a favorite.
    pub is_favorite: bool,
    /// Show edit/delete controls.
    pub can_edit: bool,
}

/// Book detail page.
pub fn book_detail(book: &Book, actions: &DetailActions) -> String {
    let favorite = if actions.signed_in {
        let label = if actions.is_favorite {
            "Remove from favorites"
        } else {
            "Add to favorites"
        };
        format!(
            r#"<button id="favorite-toggle" data-book-id="{id}">{label}</button>
    <script>
        document.getElementById('favorite-toggle').addEventListener('click', async (e) => {{
            const button = e.currentTarget;
            const res = await fetch('/favorites/toggle/' + button.dataset.bookId, {{ method: 'POST' }});
            if (!res.ok) return;
            const data = await res.json();
            button.textContent = data.is_favorite ? 'Remove from favorites' : 'Add to favorites';
        }});
    </script>"#,
            id = book.id,
            label = label
        )
    } else {
        r#"<p class="muted"><a href="/auth/login">Log in</a> to add this book to your favorites.</p>"#
            .to_string()
    };

    let management = if actions.can_edit {
        format!(
            r#"<p><a href="/books/{id}/edit">Edit</a>
        <form class="inline" method="post" action="/books/{id}/delete">
            <button type="submit" onclick="return confirm('Delete this book?')">Delete</button>
        </form></p>"#,
            id = book.id
        )
    } else {
        String::new()
    };

    format!(
        r#"{cover}
    <p><strong>Author:</strong> {author}</p>
    <p><strong>Genre:</strong> {genre}</p>
    <p><strong>Year:</strong> {year}</p>
    <p>{description}</p>
    {favorite}
    {management}"#,
        cover = cover(book),
        author = escape(&book.author),
        genre = escape(&book.genre),
        year = book.year,
        description = escape(&book.description),
        favorite = favorite,
        management = management,
    )
}

/// Add/edit book form.
pub fn book_form(book: Option<&Book>) -> String {
    let (action, submit) = match book {
        Some(book) => (format!("/books/{}/edit", book.id), "Save"),
        None => ("/books/add".to_string(), "Add"),
    };
    let field = |get: fn(&Book) -> String| book.map(|b| escape(&get(b))).unwrap_or_default();
    let current_image = book
        .and_then(|b| b.image.as_deref())
        .map(|image| format!(r#"<p class="muted">Current image: {}</p>"#, escape(image)))
        .unwrap_or_default();

    format!(
        r#"<form method="post" action="{action}" enctype="multipart/form-data">
        <label>Title <input name="title" required value="{title}"></label>
        <label>Author <input name="author" required value="{author}"></label>
        <label>Genre <input name="genre" value="{genre}"></label>
        <label>Year <input name="year" type="number" required value="{year}"></label>
        <label>Description <textarea name="description">{description}</textarea></label>
        {current_image}
        <label>Cover image (png, jpg, jpeg, gif) <input name="image" type="file" accept=".png,.jpg,.jpeg,.gif"></label>
        <p><button type="submit">{submit}</button></p>
    </form>"#,
        action = action,
        title = field(|b: &Book| b.title.clone()),
        author = field(|b: &Book| b.author.clone()),
        genre = field(|b: &Book| b.genre.clone()),
        year = field(|b: &Book| b.year.to_string()),
        description = field(|b: &Book| b.description.clone()),
        current_image = current_image,
        submit = submit,
    )
}

/// Search page, with results once a query was posted.
pub fn search(query: &str, results: Option<&[Book]>) -> String {
    let results = results
        .map(|books| {
            format!(
                r#"<h2>Results for "{}"</h2>
    {}"#,
                escape(query),
                book_items(books, "/books")
            )
        })
        .unwrap_or_default();

    format!(
        r#"<form method="post" action="/search">
        <input name="query" placeholder="Title or author" value="{}" required>
        <button type="submit">Search</button>
    </form>
    {}"#,
        escape(query),
        results
    )
}

/// Login form.
pub fn login() -> String {
    r#"<form method="post" action="/auth/login">
        <label>Username <input name="username" required autofocus></label>
        <label>Password <input name="password" type="password" required></label>
        <p><button type="submit">Log in</button></p>
    </form>
    <p class="muted">No account? <a href="/auth/register">Register</a></p>"#
        .to_string()
}

fn account_fields() -> &'static str {
    r#"<label>Username <input name="username" required></label>
        <label>Email <input name="email" type="email" required></label>
        <label>Password <input name="password" type="password" required></label>
        <label>Confirm password <input name="confirm_password" type="password" required></label>"#
}

/// Registration form.
pub fn register(allow_role_selection: bool) -> String {
    let role = if allow_role_selection {
        r#"<label>Role <select name="role"><option value="client">Client</option><option value="admin">Admin</option></select></label>"#
    } else {
        ""
    };

    format!(
        r#"<form method="post" action="/auth/register">
        {}
        {}
        <p><button type="submit">Register</button></p>
    </form>
    <p class="muted">Already registered? <a href="/auth/login">Log in</a></p>"#,
        account_fields(),
        role
    )
}

/// Admin registration form.
pub fn register_admin() -> String {
    format!(
        r#"<form method="post" action="/auth/register-admin">
        {}
        <label>Admin code <input name="admin_code" type="password" required></label>
        <p><button type="submit">Register as admin</button></p>
    </form>"#,
        account_fields()
    )
}

/// Admin dashboard.
pub fn admin_dashboard(total_books: usize, total_users: usize, recent: &[Book]) -> String {
    format!(
        r#"<div class="stats">
        <div><strong>{total_books}</strong> books</div>
        <div><strong>{total_users}</strong> users</div>
    </div>
    <h2>Recent books</h2>
    {items}
    <p><a href="/admin/api/stats">Statistics (JSON)</a></p>"#,
        items = book_items(recent, "/books"),
    )
}

/// User management table.
pub fn manage_users(users: &[User], current_user_id: &str) -> String {
    let rows: String = users
        .iter()
        .map(|user| {
            let actions = if user.id == current_user_id {
                r#"<span class="muted">(you)</span>"#.to_string()
            } else {
                format!(
                    r#"<form class="inline" method="post" action="/admin/users/{id}/role">
                <select name="role">
                    <option value="client"{client}>client</option>
                    <option value="admin"{admin}>admin</option>
                </select>
                <button type="submit">Set role</button>
            </form>
            <form class="inline" method="post" action="/admin/users/{id}/delete">
                <button type="submit" onclick="return confirm('Delete this user?')">Delete</button>
            </form>"#,
                    id = user.id,
                    client = if user.role == crate::db::Role::Client { " selected" } else { "" },
                    admin = if user.role == crate::db::Role::Admin { " selected" } else { "" },
                )
            };
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&user.username),
                escape(&user.email),
                user.role,
                if user.is_active { "active" } else { "disabled" },
                actions
            )
        })
        .collect();

    format!(
        r#"<table>
        <tr><th>Username</th><th>Email</th><th>Role</th><th>Status</th><th></th></tr>
        {rows}
    </table>"#
    )
}

/// Admin profile with update and password forms.
pub fn admin_profile(user: &User) -> String {
    format!(
        r#"<p><strong>Role:</strong> {role}{note}</p>
    <h2>Profile</h2>
    <form method="post" action="/admin/profile/update">
        <label>Username <input name="username" value="{username}"></label>
        <label>Email <input name="email" type="email" value="{email}"></label>
        <p><button type="submit">Update profile</button></p>
    </form>
    <h2>Change password</h2>
    <form method="post" action="/admin/profile/change-password">
        <label>Current password <input name="current_password" type="password" required></label>
        <label>New password <input name="new_password" type="password" required></label>
        <label>Confirm new password <input name="confirm_password" type="password" required></label>
        <p><button type="submit">Change password</button></p>
    </form>"#,
        role = user.role,
        note = if user.is_super_admin() {
            r#" <span class="muted">(recreated on startup when bootstrap is enabled)</span>"#
        } else {
            ""
        },
        username = escape(&user.username),
        email = escape(&user.email),
    )
}

/// Client dashboard.
pub fn client_dashboard(user: &User, books: &[Book]) -> String {
    format!(
        r#"<p>Hello, {name}. You have {count} favorite(s). <a href="/client/favorites">View them</a>.</p>
    <h2>Books</h2>
    {items}
    <p><a href="/client/books">Browse all books</a></p>"#,
        name = escape(&user.username),
        count = user.favorites.len(),
        items = book_items(books, "/client/books"),
    )
}

/// Client profile.
pub fn client_profile(user: &User) -> String {
    let member_since = crate::db::timestamp_to_datetime(user.created_at).format("%Y-%m-%d");
    format!(
        r#"<p><strong>Username:</strong> {username}</p>
    <p><strong>Email:</strong> {email}</p>
    <p><strong>Role:</strong> {role}</p>
    <p><strong>Member since:</strong> {member_since}</p>
    <p><strong>Favorites:</strong> {favorites}</p>"#,
        username = escape(&user.username),
        email = escape(&user.email),
        role = user.role,
        member_since = member_since,
        favorites = user.favorites.len(),
    )
}

/// Favorites list with remove buttons.
pub fn favorites(books: &[Book], detail_base: &str) -> String {
    if books.is_empty() {
        return r#"<p class="muted">No favorites yet.</p>"#.to_string();
    }

    books
        .iter()
        .map(|book| {
            format!(
                r#"<div class="book"><a href="{base}/{id}"><strong>{title}</strong></a>
    <span class="muted">by {author}</span>
    <form class="inline" method="post" action="/favorites/remove/{id}"><button type="submit">Remove</button></form></div>"#,
                base = detail_base,
                id = book.id,
                title = escape(&book.title),
                author = escape(&book.author),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
