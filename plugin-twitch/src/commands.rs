use itertools::Itertools;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{multispace0, multispace1},
    combinator::{all_consuming, map},
    multi::many0,
    sequence::{preceded, terminated},
    Finish, IResult,
};
use plugin_core::{
    utils::parser::{channel_id, command_args, login},
    ChannelId, CommunityId,
};

use crate::errors::StoreError;
use crate::store::StatusStore;

pub const COMMAND_NAME: &str = "twitchnotifier";

pub const HELP: &str = "Manage Twitch notifications: \
    &twitchnotifier setchannel <channel>... | addstreamer <name> | removestreamer <name> \
    | listchannels | removechannel <channel> | liststreamers";

#[derive(Debug, PartialEq, Eq)]
pub enum NotifierCmd<'input> {
    SetChannel(Vec<ChannelId>),
    AddStreamer(&'input str),
    RemoveStreamer(&'input str),
    ListChannels,
    RemoveChannel(ChannelId),
    ListStreamers,
    /// no subcommand, or one that doesn't parse
    Help,
}

/// Returns None if the message isn't a twitchnotifier command
pub fn parse_command(input: &str) -> Option<NotifierCmd<'_>> {
    let args = command_args(COMMAND_NAME, input)?;
    if args.is_empty() {
        return Some(NotifierCmd::Help);
    }

    let parsed = all_consuming(terminated(subcommand, multispace0))(args)
        .finish()
        .map(|x| x.1);
    Some(parsed.unwrap_or(NotifierCmd::Help))
}

fn subcommand(input: &str) -> IResult<&str, NotifierCmd<'_>> {
    alt((
        map(
            preceded(tag("setchannel"), many0(preceded(multispace1, channel_id))),
            NotifierCmd::SetChannel,
        ),
        map(
            preceded(tag("addstreamer"), preceded(multispace1, login)),
            NotifierCmd::AddStreamer,
        ),
        map(
            preceded(tag("removestreamer"), preceded(multispace1, login)),
            NotifierCmd::RemoveStreamer,
        ),
        map(
            preceded(tag("removechannel"), preceded(multispace1, channel_id)),
            NotifierCmd::RemoveChannel,
        ),
        map(tag("listchannels"), |_| NotifierCmd::ListChannels),
        map(tag("liststreamers"), |_| NotifierCmd::ListStreamers),
    ))(input)
}

fn mention(channel: &ChannelId) -> String {
    format!("<#{}>", channel)
}

/// Run a command for the given community, returning the reply.
pub async fn handle_command(
    store: &StatusStore,
    community: CommunityId,
    cmd: NotifierCmd<'_>,
) -> Result<String, StoreError> {
    let reply = match cmd {
        NotifierCmd::Help => HELP.to_string(),

        NotifierCmd::SetChannel(ids) => {
            let ids = ids.into_iter().unique().collect::<Vec<_>>();
            let reply = if ids.is_empty() {
                "Notification channels cleared.".to_string()
            } else {
                format!(
                    "Notification channels set to {}.",
                    ids.iter().map(mention).join(", ")
                )
            };
            store
                .update(community, |roster| roster.channel_ids = ids)
                .await?;
            reply
        }

        NotifierCmd::AddStreamer(name) => {
            let name = name.to_lowercase();
            let added = store
                .update(community, |roster| {
                    if roster.streamers.contains_key(&name) {
                        false
                    } else {
                        roster.streamers.insert(name.clone(), false);
                        true
                    }
                })
                .await?;
            if added {
                format!("Added {name} to the notification list.")
            } else {
                format!("{name} is already in the notification list.")
            }
        }

        NotifierCmd::RemoveStreamer(name) => {
            let name = name.to_lowercase();
            let removed = store
                .update(community, |roster| roster.streamers.remove(&name).is_some())
                .await?;
            if removed {
                format!("Removed {name} from the notification list.")
            } else {
                format!("{name} is not in the notification list.")
            }
        }

        NotifierCmd::ListChannels => {
            let roster = store.get_roster(community).await;
            if roster.channel_ids.is_empty() {
                "No channels have been set for notifications.".to_string()
            } else {
                format!(
                    "Notification channels: {}",
                    roster.channel_ids.iter().map(mention).join(", ")
                )
            }
        }

        NotifierCmd::RemoveChannel(channel) => {
            let removed = store
                .update(community, |roster| {
                    let before = roster.channel_ids.len();
                    roster.channel_ids.retain(|c| *c != channel);
                    roster.channel_ids.len() != before
                })
                .await?;
            if removed {
                format!("Removed {} from the notification list.", mention(&channel))
            } else {
                format!("Channel {} is not in the notification list.", mention(&channel))
            }
        }

        NotifierCmd::ListStreamers => {
            let roster = store.get_roster(community).await;
            if roster.streamers.is_empty() {
                "No streamers are being tracked.".to_string()
            } else {
                let streamers = roster
                    .streamers
                    .iter()
                    .map(|(name, is_live)| {
                        if *is_live {
                            format!("{name} (live)")
                        } else {
                            name.clone()
                        }
                    })
                    .join(", ");
                format!("Tracked streamers: {streamers}")
            }
        }
    };
    Ok(reply)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::test::roster;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("twitchnotifier listchannels"), None);
        assert_eq!(parse_command("&twitch listchannels"), None);
        assert_eq!(
            parse_command("&twitchnotifier"),
            Some(NotifierCmd::Help),
            "bare command shows the help"
        );
        assert_eq!(
            parse_command("&twitchnotifier setchannel 1 <#2>  3 "),
            Some(NotifierCmd::SetChannel(vec![
                ChannelId(1),
                ChannelId(2),
                ChannelId(3)
            ]))
        );
        assert_eq!(
            parse_command("&twitchnotifier setchannel"),
            Some(NotifierCmd::SetChannel(vec![]))
        );
        assert_eq!(
            parse_command("λtwitchnotifier addstreamer Some_Streamer"),
            Some(NotifierCmd::AddStreamer("Some_Streamer"))
        );
        assert_eq!(
            parse_command("&twitchnotifier removestreamer bob"),
            Some(NotifierCmd::RemoveStreamer("bob"))
        );
        assert_eq!(
            parse_command("&twitchnotifier removechannel <#42>"),
            Some(NotifierCmd::RemoveChannel(ChannelId(42)))
        );
        assert_eq!(
            parse_command("&twitchnotifier liststreamers"),
            Some(NotifierCmd::ListStreamers)
        );
    }

    #[test]
    fn test_parse_invalid_arguments() {
        assert_eq!(
            parse_command("&twitchnotifier setchannel 1 general"),
            Some(NotifierCmd::Help),
            "channel ids are numbers"
        );
        assert_eq!(
            parse_command("&twitchnotifier addstreamer"),
            Some(NotifierCmd::Help),
            "missing streamer name"
        );
        assert_eq!(
            parse_command("&twitchnotifier addstreamer a b"),
            Some(NotifierCmd::Help),
            "a single streamer at a time"
        );
        assert_eq!(
            parse_command("&twitchnotifier dance"),
            Some(NotifierCmd::Help)
        );
    }

    async fn run(store: &StatusStore, input: &str) -> String {
        let cmd = parse_command(input).expect("a twitchnotifier command");
        handle_command(store, CommunityId(1), cmd).await.unwrap()
    }

    #[tokio::test]
    async fn set_then_list_channels_keeps_order() {
        let store = StatusStore::in_memory();
        assert_eq!(
            run(&store, "&twitchnotifier listchannels").await,
            "No channels have been set for notifications."
        );
        assert_eq!(
            run(&store, "&twitchnotifier setchannel 3 1 2 1").await,
            "Notification channels set to <#3>, <#1>, <#2>."
        );
        assert_eq!(
            run(&store, "&twitchnotifier setchannel 1 2 3").await,
            "Notification channels set to <#1>, <#2>, <#3>."
        );
        assert_eq!(
            run(&store, "&twitchnotifier listchannels").await,
            "Notification channels: <#1>, <#2>, <#3>"
        );
    }

    #[tokio::test]
    async fn remove_channel() {
        let store = StatusStore::in_memory();
        run(&store, "&twitchnotifier setchannel 1 2").await;
        assert_eq!(
            run(&store, "&twitchnotifier removechannel 1").await,
            "Removed <#1> from the notification list."
        );
        assert_eq!(
            run(&store, "&twitchnotifier removechannel 1").await,
            "Channel <#1> is not in the notification list."
        );
        assert_eq!(store.get_roster(CommunityId(1)).await.channel_ids, vec![ChannelId(2)]);

        assert_eq!(
            run(&store, "&twitchnotifier setchannel").await,
            "Notification channels cleared."
        );
        assert!(store.get_roster(CommunityId(1)).await.channel_ids.is_empty());
    }

    #[tokio::test]
    async fn add_and_remove_streamers() {
        let store = StatusStore::in_memory();
        assert_eq!(
            run(&store, "&twitchnotifier addstreamer Alice").await,
            "Added alice to the notification list."
        );
        assert_eq!(
            run(&store, "&twitchnotifier addstreamer alice").await,
            "alice is already in the notification list."
        );
        assert_eq!(
            store.get_roster(CommunityId(1)).await,
            roster(&[("alice", false)], &[])
        );

        assert_eq!(
            run(&store, "&twitchnotifier removestreamer bob").await,
            "bob is not in the notification list."
        );
        assert_eq!(
            run(&store, "&twitchnotifier removestreamer ALICE").await,
            "Removed alice from the notification list."
        );
        assert!(store.get_roster(CommunityId(1)).await.streamers.is_empty());
    }

    #[tokio::test]
    async fn adding_a_tracked_streamer_keeps_its_status() {
        let store = StatusStore::in_memory();
        store
            .set_roster(CommunityId(1), roster(&[("alice", true)], &[5]))
            .await
            .unwrap();
        run(&store, "&twitchnotifier addstreamer alice").await;
        assert_eq!(
            store.get_roster(CommunityId(1)).await,
            roster(&[("alice", true)], &[5])
        );
    }

    #[tokio::test]
    async fn list_streamers() {
        let store = StatusStore::in_memory();
        assert_eq!(
            run(&store, "&twitchnotifier liststreamers").await,
            "No streamers are being tracked."
        );
        store
            .set_roster(CommunityId(1), roster(&[("bob", false), ("alice", true)], &[]))
            .await
            .unwrap();
        assert_eq!(
            run(&store, "&twitchnotifier liststreamers").await,
            "Tracked streamers: alice (live), bob"
        );
    }

    #[tokio::test]
    async fn communities_are_independent() {
        let store = StatusStore::in_memory();
        run(&store, "&twitchnotifier setchannel 1").await;
        let other = handle_command(&store, CommunityId(2), NotifierCmd::ListChannels)
            .await
            .unwrap();
        assert_eq!(other, "No channels have been set for notifications.");
    }
}
