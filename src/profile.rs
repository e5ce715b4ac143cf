//! Account profile assembly.
//!
//! The profile is refreshed wholesale from upstream: shortened links in the
//! description and website fields are swapped for their expanded form, and
//! the avatar is carried as a [`Media`] entry.

use chrono::{DateTime, Utc};
use regex::RegexBuilder;

use crate::config::AccountConfig;
use crate::model::{Media, Profile, SourceEntities, SourceUser};

/// Replace each shortened url in `text` with its expanded form.
///
/// Matching is case-insensitive and only at word boundaries, so one short
/// link never clobbers a longer one sharing its prefix.
#[must_use]
pub fn expand_links(text: &str, entities: &SourceEntities) -> String {
    let mut out = text.to_string();
    for link in &entities.urls {
        let Some(expanded) = link.expanded_url.as_deref().filter(|e| !e.is_empty()) else {
            continue;
        };
        if link.url.is_empty() {
            continue;
        }
        let pattern = format!(r"(^|\b){}(\b|$)", regex::escape(&link.url));
        let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
            continue;
        };
        out = re
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                format!(
                    "{}{expanded}{}",
                    caps.get(1).map_or("", |m| m.as_str()),
                    caps.get(2).map_or("", |m| m.as_str())
                )
            })
            .into_owned();
    }
    out
}

/// Build the archived profile from an upstream account.
///
/// The profile is keyed by the configured handle; the display url follows
/// upstream's capitalization of the screen name.
#[must_use]
pub fn build_profile(user: &SourceUser, account: &AccountConfig, now: DateTime<Utc>) -> Profile {
    let screen_name = if user.screen_name.is_empty() {
        account.handle.clone()
    } else {
        user.screen_name.clone()
    };
    let avatar_url = user.profile_image_url_https.clone();

    Profile {
        name: user.name.clone(),
        description: expand_links(
            user.description.as_deref().unwrap_or_default(),
            &user.entities.description,
        ),
        followers: user.followers_count,
        following: user.friends_count,
        item_count: user.statuses_count,
        avatar: Media {
            media_type: "photo".to_string(),
            id_str: format!("avatar-{}", user.id_str),
            url: avatar_url.clone(),
            expanded_url: avatar_url.clone(),
            media_url: avatar_url,
            storage_path: None,
        },
        url: AccountConfig {
            handle: screen_name,
            site_url: account.site_url.clone(),
        }
        .profile_url(),
        location: user.location.clone().unwrap_or_default(),
        verified: user.verified,
        link: expand_links(user.url.as_deref().unwrap_or_default(), &user.entities.url),
        updated: now,
        handle: account.handle.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceUrl;

    fn link(short: &str, expanded: &str) -> SourceUrl {
        SourceUrl {
            url: short.to_string(),
            expanded_url: Some(expanded.to_string()),
            display_url: None,
        }
    }

    #[test]
    fn expands_known_links() {
        let entities = SourceEntities {
            urls: vec![link("https://t.co/abc", "https://example.com/page")],
            ..SourceEntities::default()
        };
        assert_eq!(
            expand_links("see https://t.co/abc for more", &entities),
            "see https://example.com/page for more"
        );
        assert_eq!(
            expand_links("HTTPS://T.CO/ABC", &entities),
            "https://example.com/page"
        );
    }

    #[test]
    fn prefix_links_do_not_collide() {
        let entities = SourceEntities {
            urls: vec![link("https://t.co/ab", "https://short.example")],
            ..SourceEntities::default()
        };
        assert_eq!(
            expand_links("https://t.co/abc", &entities),
            "https://t.co/abc"
        );
    }

    #[test]
    fn missing_expansion_leaves_text() {
        let entities = SourceEntities {
            urls: vec![SourceUrl {
                url: "https://t.co/x1".to_string(),
                ..SourceUrl::default()
            }],
            ..SourceEntities::default()
        };
        assert_eq!(expand_links("at https://t.co/x1", &entities), "at https://t.co/x1");
        assert_eq!(expand_links("", &entities), "");
    }

    #[test]
    fn builds_profile_from_user() {
        let mut user = SourceUser {
            id_str: "77".to_string(),
            screen_name: "Someone".to_string(),
            name: "Some One".to_string(),
            description: Some("blog: https://t.co/d".to_string()),
            url: Some("https://t.co/u".to_string()),
            followers_count: 12,
            friends_count: 3,
            statuses_count: 900,
            profile_image_url_https: "https://pbs.twimg.com/profile_images/1/a.jpg".to_string(),
            ..SourceUser::default()
        };
        user.entities.description.urls.push(link("https://t.co/d", "https://blog.example"));
        user.entities.url.urls.push(link("https://t.co/u", "https://home.example"));

        let account = AccountConfig {
            handle: "someone".to_string(),
            site_url: "https://twitter.com/".to_string(),
        };
        let now = Utc::now();
        let profile = build_profile(&user, &account, now);

        assert_eq!(profile.handle, "someone");
        assert_eq!(profile.description, "blog: https://blog.example");
        assert_eq!(profile.link, "https://home.example");
        assert_eq!(profile.url, "https://twitter.com/Someone");
        assert_eq!(profile.avatar.id_str, "avatar-77");
        assert_eq!(profile.item_count, 900);
        assert_eq!(profile.updated, now);
    }
}
