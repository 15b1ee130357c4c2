use nom::{
    branch::alt,
    bytes::complete::{is_a, tag},
    character::complete::{alphanumeric1, char, digit1},
    combinator::{map, map_res, recognize, verify},
    multi::many1,
    sequence::{delimited, preceded},
    IResult,
};

use crate::ChannelId;

/// A twitch style login: ascii letters, digits and underscores
pub fn login(input: &str) -> IResult<&str, &str> {
    recognize(many1(alt((alphanumeric1, tag("_")))))(input)
}

fn snowflake(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>())(input)
}

/// A channel id, either raw (`1234`) or as a channel mention (`<#1234>`)
pub fn channel_id(input: &str) -> IResult<&str, ChannelId> {
    map(
        verify(
            alt((delimited(tag("<#"), snowflake, char('>')), snowflake)),
            |id: &u64| *id != 0,
        ),
        ChannelId,
    )(input)
}

/// Utility to parse common command prefix
pub fn command_prefix(input: &str) -> nom::IResult<&str, &str> {
    alt((is_a("&"), is_a("λ")))(input)
}

/// Match a prefixed command and return what comes after it, trimmed.
/// Returns None if the input isn't this command.
pub fn command_args<'input>(cmd_name: &'static str, input: &'input str) -> Option<&'input str> {
    let parsed: IResult<&str, &str> = preceded(command_prefix, tag(cmd_name))(input.trim_start());
    let (rest, _) = parsed.ok()?;

    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        // some other command sharing the same prefix
        None
    }
}
