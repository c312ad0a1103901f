pub use crate::error::Result;
use crate::config::config;
use crate::error::Error;
use crate::model::Db;
use crate::model::store::{
    prepare_export_response, prepare_import_response, prepare_lead_response,
    prepare_leads_response,
};
use crate::model::sync::sync;
use dotenvy::dotenv;
use teloxide::{prelude::*, utils::command::BotCommands};

mod amo;
mod config;
mod error;
mod model;
mod worker;

#[tokio::main]
async fn main() -> Result<()> {
    // variables may come from the environment alone
    dotenv().ok();

    pretty_env_logger::init();
    log::info!("Starting command bot...");

    // fail fast on a broken environment
    config();
    Db::new().await?.db.close().await;

    let bot = Bot::from_env();
    bot.set_my_commands(Command::bot_commands()).await?;

    worker::do_work(bot.clone());

    Command::repl(bot, answer).await;

    Ok(())
}

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "Сделки из AmoCRM:"
)]
enum Command {
    #[command(description = "Список команд")]
    Help,
    #[command(description = "Запросить новые сделки из AmoCRM")]
    Sync,
    #[command(description = "Последние сделки")]
    Leads,
    #[command(description = "Карточка сделки: /lead <номер>")]
    Lead(String),
    #[command(description = "Сделка в формате JSON: /export <номер>")]
    Export(String),
    #[command(description = "Сохранить сделку из JSON: /import <json>")]
    Import(String),
}

async fn answer(bot: Bot, msg: Message, cmd: Command) -> ResponseResult<()> {
    let text = match cmd {
        Command::Help => Command::descriptions().to_string(),
        Command::Sync => {
            let (chat_id, reply_bot) = (msg.chat.id, bot.clone());
            let left = sync(move |digest| async move {
                reply_bot.send_message(chat_id, digest).await?;
                Ok::<(), Error>(())
            })
            .await;
            match left {
                Some(text) => text,
                None => return Ok(()),
            }
        }
        Command::Leads => with_db(|db| async move {
            prepare_leads_response(&db, config().LEADS_LIMIT).await
        })
        .await,
        Command::Lead(key) => {
            with_db(|db| async move { prepare_lead_response(&db, &key).await }).await
        }
        Command::Export(key) => {
            with_db(|db| async move { prepare_export_response(&db, &key).await }).await
        }
        Command::Import(raw) => {
            with_db(|db| async move { prepare_import_response(&db, &raw).await }).await
        }
    };
    bot.send_message(msg.chat.id, text).await?;

    Ok(())
}

async fn with_db<F, Fut>(f: F) -> String
where
    F: FnOnce(Db) -> Fut,
    Fut: Future<Output = String>,
{
    match Db::new().await {
        Ok(db) => {
            let pool = db.db.clone();
            let res = f(db).await;
            pool.close().await;
            res
        }
        Err(e) => {
            log::error!("database unavailable: {:?}", e);
            "Ошибка подключения к базе данных".to_string()
        }
    }
}
