use quick_xml::escape::escape;

use crate::feeds::FeedItem;

/// Everything a rendered email can refer to.
pub struct TemplateData<'a> {
    pub posts: &'a [FeedItem],
    pub subscriber_name: Option<&'a str>,
    pub unsubscribe_url: &'a str,
    pub new_post_text: &'a str,
    pub favicon_url: Option<&'a str>,
    pub admin_contact: Option<&'a str>,
}

pub fn render_html(data: &TemplateData) -> String {
    let favicon = data
        .favicon_url
        .map(|url| {
            format!(
                r#"<img src="{}" alt="" width="32" height="32" style="display:block;margin-bottom:16px">"#,
                escape(url)
            )
        })
        .unwrap_or_default();
    let posts: String = data
        .posts
        .iter()
        .map(|post| {
            format!(
                r#"<li style="margin-bottom:8px"><a href="{}">{}</a></li>"#,
                escape(post.link.as_str()),
                escape(post.title.as_str())
            )
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{heading}</title></head>
<body style="font-family:sans-serif;max-width:600px;margin:0 auto;padding:24px">
    {favicon}
    <p>{greeting}</p>
    <h1 style="font-size:20px">{heading}</h1>
    <ul>{posts}</ul>
    <hr>
    <p style="font-size:12px;color:#666">{contact}<a href="{unsubscribe_url}">Unsubscribe</a></p>
</body>
</html>"#,
        heading = escape(data.new_post_text),
        favicon = favicon,
        greeting = escape(greeting(data.subscriber_name).as_str()),
        posts = posts,
        contact = data
            .admin_contact
            .map(|contact| format!("Questions? Contact {}. ", escape(contact)))
            .unwrap_or_default(),
        unsubscribe_url = escape(data.unsubscribe_url),
    )
}

pub fn render_text(data: &TemplateData) -> String {
    let mut text = format!("{}\n\n{}\n\n", greeting(data.subscriber_name), data.new_post_text);

    for post in data.posts {
        text.push_str(&format!("- {}\n  {}\n", post.title, post.link));
    }

    text.push_str("\n--\n");
    if let Some(contact) = data.admin_contact {
        text.push_str(&format!("Questions? Contact {}.\n", contact));
    }
    text.push_str(&format!("Unsubscribe: {}\n", data.unsubscribe_url));

    text
}

pub fn render_welcome_html(subscriber_name: Option<&str>, unsubscribe_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Welcome</title></head>
<body style="font-family:sans-serif;max-width:600px;margin:0 auto;padding:24px">
    <p>{}</p>
    <p>Thanks for subscribing! You will get an email whenever a new post is published.</p>
    <hr>
    <p style="font-size:12px;color:#666"><a href="{}">Unsubscribe</a></p>
</body>
</html>"#,
        escape(greeting(subscriber_name).as_str()),
        escape(unsubscribe_url)
    )
}

pub fn render_welcome_text(subscriber_name: Option<&str>, unsubscribe_url: &str) -> String {
    format!(
        "{}\n\nThanks for subscribing! You will get an email whenever a new post is published.\n\n--\nUnsubscribe: {}\n",
        greeting(subscriber_name),
        unsubscribe_url
    )
}

fn greeting(subscriber_name: Option<&str>) -> String {
    match subscriber_name {
        Some(name) => format!("Hi {},", name),
        None => "Hi,".to_string(),
    }
}
