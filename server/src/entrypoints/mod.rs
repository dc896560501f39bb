use rocket::fairing::AdHoc;

pub mod leaderboards;
pub mod types;
pub mod webhooks;

pub fn stage() -> AdHoc {
    AdHoc::on_ignite("Installing entrypoints", |rocket| async {
        rocket
            .attach(webhooks::stage())
            .attach(leaderboards::stage())
    })
}
