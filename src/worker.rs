use crate::Result;
use crate::config::config;
use crate::model::sync::sync;
use cron::Schedule;
use log::{debug, error, info};
use sqlx::types::chrono::Local;
use std::str::FromStr;
use teloxide::Bot;
use teloxide::prelude::Requester;
use teloxide::types::ChatId;
use tokio::time::sleep;

pub fn do_work(bot: Bot) {
    tokio::spawn(async move {
        let schedule = match parse_schedule(&config().SCHEDULE) {
            Ok(s) => s,
            Err(e) => {
                error!("worker stopped, bad SCHEDULE: {:?}", e);
                return;
            }
        };
        debug!("Upcoming fire times:");
        for datetime in schedule.upcoming(Local).take(5) {
            debug!("-> {}", datetime);
        }

        while let Some(next) = schedule.upcoming(Local).next() {
            // a fire time that already passed runs right away
            let duration = (next - Local::now()).to_std().unwrap_or_default();
            sleep(duration).await;

            info!("scheduled sync at {}", Local::now());
            // undelivered leads are kept and offered again on the next run
            let bot = &bot;
            if let Some(left) = sync(move |digest| notify(bot, digest)).await {
                debug!("nothing posted: {}", left);
            }
        }
    });
}

fn parse_schedule(expression: &str) -> Result<Schedule> {
    Ok(Schedule::from_str(expression)?)
}

async fn notify(bot: &Bot, text: String) -> Result<()> {
    bot.send_message(ChatId(config().TG_GROUP_ID), text).await?;
    Ok(())
}
