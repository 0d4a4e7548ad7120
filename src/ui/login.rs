use std::cell::Cell;
use std::rc::Rc;

use adw::Application;
use adw::prelude::*;
use gtk4 as gtk;
use log::warn;

use crate::api::client::ApiClient;
use crate::app::{AppState, DEFAULT_BASE_URL};
use crate::state::auth::AuthMode;

pub fn show_login_window(app: &Application) {
    let window = adw::ApplicationWindow::builder()
        .application(app)
        .title("Virtual-G")
        .default_width(420)
        .default_height(380)
        .resizable(false)
        .build();

    let toast_overlay = adw::ToastOverlay::new();
    let mode = Rc::new(Cell::new(AuthMode::Login));
    let saved = AppState::load();

    let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
    root.set_margin_top(24);
    root.set_margin_bottom(24);
    root.set_margin_start(24);
    root.set_margin_end(24);

    let title = gtk::Label::new(Some(mode.get().title()));
    title.add_css_class("title-2");
    title.set_halign(gtk::Align::Start);
    root.append(&title);

    let email_entry = gtk::Entry::new();
    email_entry.set_placeholder_text(Some("Email"));
    email_entry.set_input_purpose(gtk::InputPurpose::Email);
    email_entry.set_hexpand(true);
    if let Some(email) = &saved.email {
        email_entry.set_text(email);
    }

    let pass_entry = gtk::PasswordEntry::new();
    pass_entry.set_placeholder_text(Some("Password"));
    pass_entry.set_show_peek_icon(true);
    pass_entry.set_hexpand(true);

    let form = gtk::Box::new(gtk::Orientation::Vertical, 8);
    form.append(&email_entry);
    form.append(&pass_entry);

    // Server address, rarely changed
    let server_entry = gtk::Entry::new();
    server_entry.set_placeholder_text(Some(DEFAULT_BASE_URL));
    server_entry.set_text(&saved.base_url);
    let server_expander = gtk::Expander::new(Some("Server"));
    server_expander.set_child(Some(&server_entry));
    form.append(&server_expander);
    root.append(&form);

    let status = gtk::Label::new(None);
    status.add_css_class("error");
    status.set_wrap(true);
    status.set_halign(gtk::Align::Start);
    root.append(&status);

    let submit_btn = gtk::Button::with_label(mode.get().submit_label());
    submit_btn.add_css_class("suggested-action");
    submit_btn.add_css_class("pill");
    root.append(&submit_btn);

    let switch_btn = gtk::Button::with_label(mode.get().switch_label());
    switch_btn.add_css_class("flat");
    root.append(&switch_btn);

    toast_overlay.set_child(Some(&root));
    let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
    let header = adw::HeaderBar::new();
    container.append(&header);
    container.append(&toast_overlay);
    window.set_content(Some(&container));

    {
        let mode = mode.clone();
        let title = title.clone();
        let submit_btn = submit_btn.clone();
        let status = status.clone();
        switch_btn.connect_clicked(move |btn| {
            let next = mode.get().toggled();
            mode.set(next);
            title.set_label(next.title());
            submit_btn.set_label(next.submit_label());
            btn.set_label(next.switch_label());
            status.set_label("");
        });
    }

    let on_submit = {
        let app = app.clone();
        let window = window.clone();
        let overlay = toast_overlay.clone();
        let email_entry = email_entry.clone();
        let pass_entry = pass_entry.clone();
        let server_entry = server_entry.clone();
        let submit_btn = submit_btn.clone();
        let status = status.clone();
        move || {
            let current = mode.get();
            let email = email_entry.text().trim().to_string();
            let password = pass_entry.text().to_string();
            if let Err(msg) = current.validate(&email, &password) {
                status.set_label(&msg);
                return;
            }
            let base_url = match server_entry.text().trim() {
                "" => DEFAULT_BASE_URL.to_string(),
                url => url.to_string(),
            };
            let client = match ApiClient::new(&base_url, None) {
                Ok(client) => client,
                Err(e) => {
                    status.set_label(&e.user_message());
                    return;
                }
            };

            status.set_label("");
            submit_btn.set_sensitive(false);

            let email_for_async = email.clone();
            let app = app.clone();
            let window = window.clone();
            let overlay = overlay.clone();
            let status = status.clone();
            let submit_btn = submit_btn.clone();
            crate::utils::run_async_to_main(
                async move { current.submit(&client, &email_for_async, &password).await },
                move |res: Result<String, String>| {
                    submit_btn.set_sensitive(true);
                    match res {
                        Ok(token) => {
                            let mut st = AppState::load_saved();
                            st.set_base_url(base_url);
                            st.sign_in(&email, token);
                            if let Err(e) = st.save() {
                                warn!("failed to save settings: {e}");
                                overlay.add_toast(adw::Toast::new(&format!("Failed to save settings: {}", e)));
                            }
                            crate::ui::main_window::show_main_window(&app);
                            window.close();
                        }
                        Err(msg) => {
                            warn!("{} failed: {}", current.submit_label(), msg);
                            status.set_label(&msg);
                        }
                    }
                },
            );
        }
    };

    let on_submit: Rc<dyn Fn()> = Rc::new(on_submit);
    {
        let on_submit = on_submit.clone();
        submit_btn.connect_clicked(move |_| (on_submit)());
    }
    {
        let on_submit = on_submit.clone();
        email_entry.connect_activate(move |_| (on_submit)());
    }
    {
        let on_submit = on_submit.clone();
        pass_entry.connect_activate(move |_| (on_submit)());
    }

    window.present();
}
