use std::rc::Rc;

use adw::prelude::*;
use gtk4 as gtk;

use crate::app::AppState;
use crate::ui::Shell;

pub fn show_profile_dialog(shell: &Rc<Shell>) {
    let window = adw::Window::builder()
        .title("Profile")
        .transient_for(&shell.window)
        .modal(true)
        .default_width(360)
        .build();

    let body = gtk::Box::new(gtk::Orientation::Vertical, 12);
    body.set_margin_top(18);
    body.set_margin_bottom(18);
    body.set_margin_start(18);
    body.set_margin_end(18);

    let list = gtk::ListBox::new();
    list.add_css_class("boxed-list");
    list.set_selection_mode(gtk::SelectionMode::None);
    let email = AppState::load().email.unwrap_or_default();
    let email_row = adw::ActionRow::builder().title("Email").subtitle(email.as_str()).build();
    let used_row = adw::ActionRow::builder().title("Total credits used").subtitle("Loading...").build();
    let purchased_row = adw::ActionRow::builder().title("Total credits purchased").subtitle("Loading...").build();
    list.append(&email_row);
    list.append(&used_row);
    list.append(&purchased_row);
    body.append(&list);

    let content = gtk::Box::new(gtk::Orientation::Vertical, 0);
    content.append(&adw::HeaderBar::new());
    content.append(&body);
    window.set_content(Some(&content));
    window.present();

    let client = shell.client.clone();
    let shell = shell.clone();
    crate::utils::run_async_to_main(async move { client.usage().await }, move |res| match res {
        Ok(usage) => {
            used_row.set_subtitle(&usage.credits_used.to_string());
            purchased_row.set_subtitle(&usage.total_credits_purchased.to_string());
        }
        Err(e) => {
            used_row.set_subtitle("Unavailable");
            purchased_row.set_subtitle("Unavailable");
            if e.is_auth_failure() {
                window.close();
            }
            shell.report("Failed to load usage", &e);
        }
    });
}
