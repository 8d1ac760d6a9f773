use rocket::launch;

#[launch]
fn rocket() -> _ {
    let rocket = mailsync_api::rocket();
    log::info!("starting mail sync API server");
    rocket
}
