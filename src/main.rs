mod config;
mod db;
mod entity;
mod error;
mod relation;
mod response;
mod routes;

use actix_web::{middleware, web, App, HttpServer};
use config::AppConfig;
use db::connect_db;
use log::info;
use response::json_error_handler;
use routes::{post, tag, user};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = AppConfig::from_env();
    let db = web::Data::new(connect_db(&config).await);
    let server_port = config.server_port;

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .wrap(actix_web::middleware::from_fn(routes::cors::cors_handler))
            .service(
                web::scope("/api")
                    .service(web::scope("/user").configure(user::config))
                    .service(web::scope("/post").configure(post::config))
                    .service(web::scope("/tag").configure(tag::config)),
            )
    })
    .bind(("0.0.0.0", server_port))?;
    info!("server started at http://0.0.0.0:{}", server_port);
    server.run().await
}
